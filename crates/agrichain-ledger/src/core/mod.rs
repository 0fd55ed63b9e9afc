//! Core rule checks for the ledger

mod rules;

pub use rules::{
    authorize_actor, authorize_participant, validate_custody, validate_payload,
    validate_transition,
};
