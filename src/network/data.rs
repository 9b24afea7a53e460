use serde::{Deserialize, Serialize};

use super::{ArcDirection, PlaceKind, Tokens, Weight, WorkerState};

/// A point-in-time copy of a net, for rendering and inspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetSnapshot {
    pub id: String,
    pub places: Vec<PlaceSnapshot>,
    pub transitions: Vec<TransitionSnapshot>,
    pub arcs: Vec<ArcSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceSnapshot {
    pub id: String,
    pub tokens: Tokens,
    pub kind: PlaceKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSnapshot {
    pub id: String,
    pub state: WorkerState,
    pub fired: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcSnapshot {
    pub id: String,
    pub source: String,
    pub target: String,
    pub direction: ArcDirection,
    pub label: ArcLabel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcLabel {
    Weight(Weight),
    Range {
        low: Option<Tokens>,
        high: Option<Tokens>,
    },
}

impl NetSnapshot {
    pub fn total_tokens(&self) -> Tokens {
        self.places.iter().map(|place| place.tokens).sum()
    }

    pub fn place(&self, id: &str) -> Option<&PlaceSnapshot> {
        self.places.iter().find(|place| place.id == id)
    }

    /// Whether `place` is an endpoint of one of `transition`'s arcs.
    pub fn is_connected(&self, transition: &str, place: &str) -> bool {
        self.arcs.iter().any(|arc| {
            (arc.source == transition && arc.target == place)
                || (arc.source == place && arc.target == transition)
        })
    }

    #[cfg(feature = "export_dot")]
    pub fn export_dot<W: std::io::Write>(&self, writer: &mut W, highlight: Option<&str>) {
        let mut writer = dot_writer::DotWriter::from(writer);

        super::export_dot::export_snapshot(self, &mut writer, highlight);
    }

    #[cfg(feature = "export_dot")]
    pub fn get_dot_string(&self, highlight: Option<&str>) -> String {
        let mut vec = Vec::new();
        let mut writer = dot_writer::DotWriter::from(&mut vec);

        super::export_dot::export_snapshot(self, &mut writer, highlight);

        String::from_utf8_lossy(&vec).into_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn snapshot() -> NetSnapshot {
        NetSnapshot {
            id: "net".to_string(),
            places: vec![
                PlaceSnapshot {
                    id: "P".to_string(),
                    tokens: 2,
                    kind: PlaceKind::Regular,
                },
                PlaceSnapshot {
                    id: "Q".to_string(),
                    tokens: 5,
                    kind: PlaceKind::Sink,
                },
            ],
            transitions: vec![TransitionSnapshot {
                id: "T".to_string(),
                state: WorkerState::Idle,
                fired: 0,
            }],
            arcs: vec![
                ArcSnapshot {
                    id: "P >1> T".to_string(),
                    source: "P".to_string(),
                    target: "T".to_string(),
                    direction: ArcDirection::PlaceToTransition,
                    label: ArcLabel::Weight(1),
                },
                ArcSnapshot {
                    id: "T >1> Q".to_string(),
                    source: "T".to_string(),
                    target: "Q".to_string(),
                    direction: ArcDirection::TransitionToPlace,
                    label: ArcLabel::Weight(1),
                },
            ],
        }
    }

    #[test]
    fn test_queries() {
        let snapshot = snapshot();
        assert_eq!(snapshot.total_tokens(), 7);
        assert_eq!(snapshot.place("Q").map(|place| place.tokens), Some(5));
        assert!(snapshot.place("R").is_none());
        assert!(snapshot.is_connected("T", "P"));
        assert!(snapshot.is_connected("T", "Q"));
        assert!(!snapshot.is_connected("U", "Q"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(json["places"][1]["kind"], "sink");
        assert_eq!(json["transitions"][0]["state"], "idle");
        assert_eq!(json["arcs"][0]["label"]["weight"], 1);
        assert_eq!(json["arcs"][1]["direction"], "transition_to_place");

        let back: NetSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot());
    }
}
