//! Manual recovery checkpoint for pages that show no items.
//!
//! An empty base query usually means a CAPTCHA or an unexpected layout. The
//! gate parks the page procedure until the operator sends a line on the
//! control channel. There is no timeout.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

use crate::traits::ControlChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Blocked,
    Released,
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("control channel closed while waiting for the operator")]
    Closed,
    #[error("failed to read from control channel: {0}")]
    Io(#[from] std::io::Error),
}

/// A single-use gate. A fresh one is entered every time the extractor sees
/// an empty item query.
#[derive(Debug)]
pub struct InterventionGate {
    state: GateState,
}

impl InterventionGate {
    pub fn enter() -> Self {
        Self {
            state: GateState::Blocked,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Block until the operator sends a line, then release.
    pub async fn wait<C: ControlChannel + ?Sized>(
        mut self,
        channel: &mut C,
        url: &str,
    ) -> Result<GateState, GateError> {
        warn!(
            "Items not found on {}, possibly a CAPTCHA or a layout change. Resolve it in the browser and press Enter",
            url
        );

        match channel.next_line().await? {
            Some(_) => {
                self.state = GateState::Released;
                Ok(self.state)
            }
            None => Err(GateError::Closed),
        }
    }
}

/// Operator channel backed by the process's standard input
pub struct StdinChannel {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinChannel {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlChannel for StdinChannel {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }
}

/// Channel replaying a fixed list of lines, then reporting end of input
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    lines: std::collections::VecDeque<String>,
    reads: usize,
}

impl ScriptedChannel {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            reads: 0,
        }
    }

    /// Operator who presses Enter `n` times
    pub fn releases(n: usize) -> Self {
        Self::new(std::iter::repeat_n("", n))
    }

    /// How many times the channel was read
    pub fn reads(&self) -> usize {
        self.reads
    }
}

#[async_trait]
impl ControlChannel for ScriptedChannel {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.reads += 1;
        Ok(self.lines.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_blocked_and_releases_on_any_line() {
        let gate = InterventionGate::enter();
        assert_eq!(gate.state(), GateState::Blocked);

        let mut channel = ScriptedChannel::new(["done"]);
        let state = gate.wait(&mut channel, "https://x/1").await.unwrap();
        assert_eq!(state, GateState::Released);
        assert_eq!(channel.reads(), 1);
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let mut channel = ScriptedChannel::default();
        let err = InterventionGate::enter()
            .wait(&mut channel, "https://x/1")
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Closed));
    }
}
