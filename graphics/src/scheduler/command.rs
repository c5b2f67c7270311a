//! Recorded GPU commands.
//!
//! Commands are recorded into command lists by frame jobs and kept in the
//! submitted frame report. They carry enough information (labels, textures,
//! barriers) to inspect what a frame did without a backend.

use std::sync::Arc;

use crate::resources::{Barrier, Texture};

/// A single recorded command.
#[derive(Debug, Clone)]
pub enum Command {
    /// Resource transition or aliasing hand-off.
    Barrier(Barrier),
    /// Open a named profiling/debug region.
    BeginEvent(&'static str),
    /// Close the innermost debug region.
    EndEvent,
    /// Begin a render pass writing `targets`.
    RenderPassBegin {
        label: &'static str,
        targets: Vec<Arc<Texture>>,
    },
    /// End the current render pass.
    RenderPassEnd,
    /// Draw a category of scene geometry.
    Draw { label: &'static str, count: u32 },
    /// Compute dispatch not covered by an effect.
    Dispatch { label: &'static str },
    /// Copy or resolve between textures.
    Copy {
        label: &'static str,
        source: Arc<Texture>,
        destination: Arc<Texture>,
    },
    /// Invocation of a rendering effect.
    Effect {
        name: &'static str,
        inputs: Vec<Arc<Texture>>,
        output: Option<Arc<Texture>>,
        params: Vec<(&'static str, f32)>,
    },
}

impl Command {
    /// Effect name if this is an effect invocation.
    pub fn effect_name(&self) -> Option<&'static str> {
        match self {
            Self::Effect { name, .. } => Some(*name),
            _ => None,
        }
    }

    /// Named parameter of an effect invocation.
    pub fn effect_param(&self, key: &str) -> Option<f32> {
        match self {
            Self::Effect { params, .. } => params.iter().find(|(k, _)| *k == key).map(|&(_, v)| v),
            _ => None,
        }
    }

    /// Short label for logs and frame dumps.
    pub fn label(&self) -> String {
        match self {
            Self::Barrier(Barrier::Aliasing { after, .. }) => {
                format!("aliasing barrier -> {}", after.debug_name())
            }
            Self::Barrier(Barrier::Image { texture, after, .. }) => {
                format!("barrier {} -> {after:?}", texture.debug_name())
            }
            Self::Barrier(Barrier::Memory) => "memory barrier".to_string(),
            Self::BeginEvent(name) => format!("begin {name}"),
            Self::EndEvent => "end".to_string(),
            Self::RenderPassBegin { label, .. } => format!("render pass {label}"),
            Self::RenderPassEnd => "end render pass".to_string(),
            Self::Draw { label, count } => format!("draw {label} x{count}"),
            Self::Dispatch { label } => format!("dispatch {label}"),
            Self::Copy {
                label,
                source,
                destination,
            } => format!(
                "{label} {} -> {}",
                source.debug_name(),
                destination.debug_name()
            ),
            Self::Effect { name, output, .. } => match output {
                Some(output) => format!("effect {name} -> {}", output.debug_name()),
                None => format!("effect {name}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_name() {
        let command = Command::Effect {
            name: "tonemap",
            inputs: Vec::new(),
            output: None,
            params: vec![("exposure", 1.5)],
        };
        assert_eq!(command.effect_name(), Some("tonemap"));
        assert_eq!(command.effect_param("exposure"), Some(1.5));
        assert_eq!(command.effect_param("contrast"), None);
        assert_eq!(command.label(), "effect tonemap");
        assert_eq!(Command::EndEvent.effect_name(), None);
    }
}
