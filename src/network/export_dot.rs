use super::data::{ArcLabel, NetSnapshot};
use super::ArcDirection;
use dot_writer::*;

fn place_node(id: &str) -> String {
    format!("P_{}", id)
}

fn transition_node(id: &str) -> String {
    format!("T_{}", id)
}

/// Writes `snapshot` as a graphviz digraph. Places touched by the `highlight`
/// transition are filled orange and the transition itself light blue.
pub fn export_snapshot(snapshot: &NetSnapshot, writer: &mut DotWriter, highlight: Option<&str>) {
    let mut digraph = writer.digraph();
    digraph.set_font_size(14.0);
    digraph.set("nodesep", "0.5", false);
    digraph.set("labeljust", "l", true);
    digraph.set_label(&snapshot.id);

    for place in snapshot.places.iter() {
        let mut node = digraph.node_named(&place_node(&place.id));
        node.set_shape(Shape::Circle);

        if place.tokens == 0 {
            node.set_label(&place.id);
        } else if place.tokens <= 3 {
            node.set_label(&format!("{}\n{}", place.id, "&#9679;".repeat(place.tokens as usize)));
        } else {
            node.set_label(&format!("{}\n&#9679;{}", place.id, place.tokens));
        }

        let touched = highlight.map_or(false, |transition| snapshot.is_connected(transition, &place.id));
        if touched {
            node.set_style(Style::Filled);
            node.set("fillcolor", "orange", false);
        }
    }

    for transition in snapshot.transitions.iter() {
        let mut node = digraph.node_named(&transition_node(&transition.id));
        node.set_shape(Shape::Rectangle);
        node.set_label(&transition.id);
        node.set("height", "0.4", false);
        node.set("width", "0.4", false);
        node.set("margin", "0.01", false);

        if highlight == Some(transition.id.as_str()) {
            node.set_style(Style::Filled);
            node.set("fillcolor", "lightblue", false);
        }
    }

    for arc in snapshot.arcs.iter() {
        let (source, target) = match arc.direction {
            ArcDirection::PlaceToTransition => (place_node(&arc.source), transition_node(&arc.target)),
            ArcDirection::TransitionToPlace => (transition_node(&arc.source), place_node(&arc.target)),
        };

        match arc.label {
            ArcLabel::Weight(1) => {
                digraph.edge(&source, &target);
            }
            ArcLabel::Weight(weight) => {
                digraph
                    .edge(&source, &target)
                    .attributes()
                    .set_label(&format!("{}", weight));
            }
            ArcLabel::Range { low, high } => {
                let bounds = super::EnableBounds::new(low, high);
                digraph
                    .edge(&source, &target)
                    .attributes()
                    .set("arrowhead", "dot", false)
                    .set_label(&bounds.to_string());
            }
        }
    }
}
