//! Neural defaults per node type and subtype
//!
//! Episodes start with higher difficulty and lower stability than concepts:
//! specific experiences fade faster than distilled knowledge unless they are
//! re-accessed.

use crate::memory::NodeType;

/// Initial neural parameters for a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeuralDefaults {
    /// Initial stability in days
    pub stability: f64,
    /// Initial difficulty
    pub difficulty: f64,
}

/// Per-(type, subtype) default table; subtype `None` rows are the type default
const DEFAULTS: &[(NodeType, Option<&str>, NeuralDefaults)] = &[
    (
        NodeType::Concept,
        None,
        NeuralDefaults { stability: 7.0, difficulty: 4.5 },
    ),
    (
        NodeType::Concept,
        Some("manual"),
        NeuralDefaults { stability: 9.0, difficulty: 4.0 },
    ),
    (
        NodeType::Episode,
        None,
        NeuralDefaults { stability: 3.0, difficulty: 6.5 },
    ),
    (
        NodeType::Episode,
        Some("conversation"),
        NeuralDefaults { stability: 2.5, difficulty: 7.0 },
    ),
    (
        NodeType::Cluster,
        None,
        NeuralDefaults { stability: 14.0, difficulty: 3.0 },
    ),
    (
        NodeType::Summary,
        None,
        NeuralDefaults { stability: 10.0, difficulty: 3.5 },
    ),
    (
        NodeType::Archive,
        None,
        NeuralDefaults { stability: 21.0, difficulty: 2.5 },
    ),
    (
        NodeType::Query,
        None,
        NeuralDefaults { stability: 1.0, difficulty: 5.0 },
    ),
];

/// Look up neural defaults for a (type, subtype) pair
///
/// Falls back to the type default when the subtype has no dedicated row.
pub fn neural_defaults(node_type: NodeType, subtype: Option<&str>) -> NeuralDefaults {
    if let Some(subtype) = subtype {
        if let Some((_, _, defaults)) = DEFAULTS
            .iter()
            .find(|(t, s, _)| *t == node_type && *s == Some(subtype))
        {
            return *defaults;
        }
    }
    DEFAULTS
        .iter()
        .find(|(t, s, _)| *t == node_type && s.is_none())
        .map(|(_, _, d)| *d)
        .unwrap_or(NeuralDefaults {
            stability: 5.0,
            difficulty: 5.0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episodes_fade_faster_than_concepts() {
        let concept = neural_defaults(NodeType::Concept, None);
        let episode = neural_defaults(NodeType::Episode, None);

        assert!(episode.stability < concept.stability);
        assert!(episode.difficulty > concept.difficulty);
    }

    #[test]
    fn test_subtype_override() {
        let manual = neural_defaults(NodeType::Concept, Some("manual"));
        let base = neural_defaults(NodeType::Concept, None);
        assert!(manual.stability > base.stability);
    }

    #[test]
    fn test_unknown_subtype_falls_back_to_type() {
        let fallback = neural_defaults(NodeType::Episode, Some("unheard-of"));
        assert_eq!(fallback, neural_defaults(NodeType::Episode, None));
    }
}
