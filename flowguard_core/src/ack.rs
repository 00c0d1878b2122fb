//! Outbound command correlation.
//!
//! At most one acknowledged command is in flight. A second acknowledged send
//! while one is pending is dropped, never queued. The pending entry clears on
//! a matching ack, on disconnect, or when the ack timeout elapses.

use flowguard_traits::{Millis, Transport};

use crate::error::GuardError;
use crate::hw_error::map_hw_error;
use crate::protocol::{Ack, CommandContext, CommandTag, encode_command};
use crate::util::{correlation_id, elapsed_ms};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub tag: CommandTag,
    pub correlation_id: String,
    pub issued_at_ms: Millis,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Sent {
        correlation_id: String,
        tracked: bool,
    },
    NotConnected,
    /// An acknowledged command is already outstanding.
    Busy { pending: CommandTag },
    Failed(GuardError),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

#[derive(Debug, Clone)]
pub struct AckCoordinator {
    pending: Option<PendingCommand>,
    timeout_ms: Millis,
}

impl AckCoordinator {
    pub fn new(timeout_ms: Millis) -> Self {
        Self {
            pending: None,
            timeout_ms,
        }
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Serialize and transmit `tag`; when `require_ack`, track it as pending.
    pub fn send_command<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        tag: CommandTag,
        require_ack: bool,
        ctx: &CommandContext<'_>,
        now: Millis,
    ) -> SendOutcome {
        if !transport.is_connected() {
            tracing::warn!(cmd = tag.code(), "cannot send command, transport not connected");
            return SendOutcome::NotConnected;
        }
        if require_ack && let Some(p) = &self.pending {
            tracing::info!(
                cmd = tag.code(),
                pending_cmd = p.tag.code(),
                "skipping command, still waiting for acknowledgment"
            );
            return SendOutcome::Busy { pending: p.tag };
        }

        let id = correlation_id();
        let frame = match encode_command(tag, &id, ctx) {
            Ok(f) => f,
            Err(e) => return SendOutcome::Failed(GuardError::from(e)),
        };
        if let Err(e) = transport.send_text(&frame) {
            let err = map_hw_error(&*e);
            tracing::warn!(cmd = tag.code(), error = %err, "command send failed");
            return SendOutcome::Failed(err);
        }

        if require_ack {
            tracing::info!(cmd = tag.code(), request_id = %id, "waiting for acknowledgment");
            self.pending = Some(PendingCommand {
                tag,
                correlation_id: id.clone(),
                issued_at_ms: now,
            });
        } else {
            tracing::debug!(cmd = tag.code(), request_id = %id, "command sent");
        }
        SendOutcome::Sent {
            correlation_id: id,
            tracked: require_ack,
        }
    }

    /// Clear the pending command if `ack` matches both its tag and id.
    pub fn on_ack(&mut self, ack: &Ack) -> bool {
        tracing::debug!(
            cmd = ack.tag.code(),
            request_id = %ack.request_id,
            ack = ?ack.ack_code,
            "command acknowledged"
        );
        let matches = self
            .pending
            .as_ref()
            .is_some_and(|p| p.tag == ack.tag && p.correlation_id == ack.request_id);
        if matches {
            tracing::info!(cmd = ack.tag.code(), "received expected acknowledgment");
            self.pending = None;
        }
        matches
    }

    /// Drop the pending command once it has waited `timeout_ms`.
    ///
    /// The timeout is not tied to a particular request: whatever is pending
    /// when the deadline passes is cleared.
    pub fn check_timeout(&mut self, now: Millis) -> Option<PendingCommand> {
        let expired = self
            .pending
            .as_ref()
            .is_some_and(|p| elapsed_ms(now, p.issued_at_ms) >= self.timeout_ms);
        if !expired {
            return None;
        }
        let p = self.pending.take();
        if let Some(p) = &p {
            tracing::warn!(
                cmd = p.tag.code(),
                request_id = %p.correlation_id,
                "acknowledgment timeout, clearing pending command"
            );
        }
        p
    }

    pub fn on_disconnect(&mut self) {
        if let Some(p) = self.pending.take() {
            tracing::info!(cmd = p.tag.code(), "disconnect cleared pending command");
        }
    }
}
