//! Veil core
//!
//! Turns a shielded transaction descriptor into a confirmed on-chain
//! transaction:
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌─────────┐   ┌───────┐   ┌──────────┐
//! │ Descriptor │──▶│ Resolve  │──▶│Assemble │──▶│Witness│──▶│  Prove   │
//! │ (builder)  │   │ verifier │   │ inputs  │   │       │   │ Groth16  │
//! └────────────┘   └──────────┘   └─────────┘   └───────┘   └────┬─────┘
//!                                                                │
//!                        ┌──────────────┐   ┌──────────────┐     │
//!                        │   Confirmed  │◀──│  Submitter   │◀────┘
//!                        │   Rejected   │   │ (retry, poll)│
//!                        └──────────────┘   └──────────────┘
//! ```

pub mod chain;
pub mod error;
pub mod instruction;
pub mod pipeline;
pub mod public_inputs;
pub mod submitter;
pub mod transaction;
pub mod verifier;

pub use error::{Error, Rejection, Result, Stage};
pub use pipeline::{Execution, Lifecycle, Pipeline, ProvedTransaction, TxState};
pub use public_inputs::{
    PublicInputs, PublicInputsCpi, VerifierInputs, assemble, parse_public_inputs_from_array,
};
pub use submitter::{Confirmation, Submitter, SubmitterConfig};
pub use transaction::{CpiContext, ExtData, TransactionBuilder, TransactionDescriptor, TxShape};
pub use verifier::{Resource, Verifier, VerifierConfig, VerifierKind, VerifierRegistry};
