pub mod error;
pub mod generator;
pub mod ledger;


pub use error::{ReferralError, ReferralResult};
pub use generator::{CodeGenerator, DefaultCodeGenerator};
pub use ledger::{DynReferralLedger, ReferralLedger, ReferralLedgerTrait, ReferralPolicy};
