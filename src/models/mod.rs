//! Crater production, chronology and epoch models.
//!
//! - production and equilibrium functions, polynomial or tabular (`production`)
//! - chronology functions mapping age to 1 km crater density (`chronology`)
//! - the constrained expression evaluator for user chronologies (`expr`)
//! - named epoch systems (`epochs`)

pub mod chronology;
pub mod epochs;
pub mod expr;
pub mod production;

pub use chronology::*;
pub use epochs::*;
pub use expr::Formula;
pub use production::*;
