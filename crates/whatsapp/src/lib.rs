//! WhatsApp transport surface: inbound webhook payloads, the TwiML-style
//! reply envelope, pre-dispatch slash commands, the outbound transport and
//! the background dispatch queue.

pub mod commands;
pub mod dispatch;
pub mod envelope;
pub mod transport;

pub use commands::{immediate_ack, parse_command, SlashCommand};
pub use dispatch::{DispatchQueue, MessagePipeline, QueueStatsSnapshot, QUEUE_FULL_REPLY};
pub use envelope::{EnvelopeError, InboundMessage, TwimlReply, WebhookForm};
pub use transport::{
    format_outbound, MessageTransport, NoopTransport, SendOutcome, TwilioTransport,
};
