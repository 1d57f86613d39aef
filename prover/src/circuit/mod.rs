pub mod gadgets;
pub mod transaction;

pub use transaction::{
    InputNoteWitness, KycWitness, OutputNoteWitness, PrivateInputs, TransactionCircuit,
};
