//! Structural view of single diff lines for the lineage platform.
//!
//! Provides the fragment normalizer (syntax completion, wrap archetypes and canonical
//! node extraction via tree-sitter), the structural comparator, the Ratcliff/Obershelp
//! [`sequence`] ratio used for every similarity signal, and the change classifier.

pub mod classify;
pub mod extract;
pub mod normalize;
pub mod sequence;
pub mod structure;

pub use classify::classify;
pub use extract::{AstNode, NodeValue};
pub use normalize::{normalize, NormalizedFragment, Unparsable, WrapArchetype};
pub use structure::{root_type, structural_similarity};
