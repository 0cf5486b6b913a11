pub use crate::{
    misc::{AttesterDuty, ProposerDuty},
    validator::{ExecutionEngine, Publisher, Validator, ValidatorConfig},
};

mod misc;
mod validator;
