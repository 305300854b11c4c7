//! Core types for moot consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Identifiers**: [`Pid`], [`Height`], [`Round`]
//! - **Payloads**: [`Value`], [`Signature`]
//! - **Protocol messages**: [`Propose`], [`Prevote`], [`Precommit`], and the
//!   [`Message`] sum type
//! - **Wire format**: canonical binary encoding and the signature digest
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer. Everything
//! here is passive data: no I/O, no clocks, no cryptography beyond hashing.

mod identifiers;
mod message;
mod pid;
mod value;
mod wire;

pub use identifiers::{Height, Round};
pub use message::{Message, MessageType, Precommit, Prevote, Propose, Signature};
pub use pid::Pid;
pub use value::Value;
pub use wire::{decode_message, encode_message, sig_hash, WireError};
