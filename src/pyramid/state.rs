use serde::{Deserialize, Serialize};

/// Where a node stands in getting texture data for its own tile
///
/// ```text
/// Unresolved -> Resolving -> Resolved | Unresolvable
/// Resolved | Unresolvable -> Unresolved   (tile version changed)
/// any -> Suspended -> Unresolved          (suspend / resume)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResolutionState {
    #[default]
    Unresolved,
    /// A load is in flight
    Resolving,
    /// Holds a texture current for its tile version
    Resolved,
    /// The provider has no data for this tile
    Unresolvable,
    Suspended,
}

impl ResolutionState {
    /// Resolved and Unresolvable are where loads end up
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Unresolvable)
    }
}

impl std::fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unresolved => "unresolved",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Unresolvable => "unresolvable",
            Self::Suspended => "suspended",
        };
        f.write_str(name)
    }
}
