pub use crate::{
    combined::{state_transition, SignatureStrategy, StateRootPolicy},
    error::Error,
};

pub mod altair;
pub mod bellatrix;
pub mod combined;
pub mod phase0;
pub mod unphased;

mod error;
