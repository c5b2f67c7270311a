//! Effect invocations.
//!
//! Each function records one effect into a command list: a debug region,
//! the transition of the output into a writable state, the effect itself and
//! the transition back. Functions take the persistent bundle (when the effect
//! has one), inputs, output and tunable parameters.

use std::sync::Arc;

use crate::resources::{Barrier, ResourceState, Texture};
use crate::scheduler::{Command, CommandList, FrameSchedule};

use super::EffectResources;

/// Record an effect invocation.
pub fn record_effect(
    schedule: &FrameSchedule,
    cmd: CommandList,
    name: &'static str,
    bundle: Option<&EffectResources>,
    inputs: &[&Arc<Texture>],
    output: Option<&Arc<Texture>>,
    params: &[(&'static str, f32)],
) {
    let mut all_inputs: Vec<Arc<Texture>> = inputs.iter().map(|t| Arc::clone(t)).collect();
    if let Some(bundle) = bundle {
        all_inputs.extend(bundle.textures().iter().map(|(_, t)| Arc::clone(t)));
    }

    let mut commands = Vec::with_capacity(5);
    commands.push(Command::BeginEvent(name));
    if let Some(output) = output {
        commands.push(Command::Barrier(Barrier::image(
            output,
            ResourceState::ShaderResource,
            ResourceState::UnorderedAccess,
        )));
    }
    commands.push(Command::Effect {
        name,
        inputs: all_inputs,
        output: output.cloned(),
        params: params.to_vec(),
    });
    if let Some(output) = output {
        commands.push(Command::Barrier(Barrier::image(
            output,
            ResourceState::UnorderedAccess,
            ResourceState::ShaderResource,
        )));
    }
    commands.push(Command::EndEvent);
    schedule.record_all(cmd, commands);
}

/// Ambient occlusion parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AoParams {
    pub range: f32,
    pub power: f32,
    pub sample_count: u32,
}

impl Default for AoParams {
    fn default() -> Self {
        Self {
            range: 1.0,
            power: 1.0,
            sample_count: 16,
        }
    }
}

/// Screen-space, horizon-based, multi-scale or ray-traced occlusion into `output`.
pub fn ambient_occlusion(
    schedule: &FrameSchedule,
    cmd: CommandList,
    name: &'static str,
    bundle: &EffectResources,
    depth: &Arc<Texture>,
    output: &Arc<Texture>,
    params: AoParams,
) {
    record_effect(
        schedule,
        cmd,
        name,
        Some(bundle),
        &[depth],
        Some(output),
        &[
            ("range", params.range),
            ("power", params.power),
            ("samples", params.sample_count as f32),
        ],
    );
}

/// Screen-space or ray-traced reflections into `output`.
pub fn reflections(
    schedule: &FrameSchedule,
    cmd: CommandList,
    name: &'static str,
    bundle: &EffectResources,
    inputs: &[&Arc<Texture>],
    output: &Arc<Texture>,
    roughness_cutoff: f32,
) {
    record_effect(
        schedule,
        cmd,
        name,
        Some(bundle),
        inputs,
        Some(output),
        &[("roughness_cutoff", roughness_cutoff)],
    );
}

/// Light culling into per-tile light lists.
pub fn tiled_light_culling(schedule: &FrameSchedule, cmd: CommandList, bundle: &EffectResources, depth: &Arc<Texture>) {
    record_effect(schedule, cmd, "tiled_light_culling", Some(bundle), &[depth], None, &[]);
}

/// Temporal anti-aliasing resolving `input` against history into `output`.
pub fn temporal_aa(
    schedule: &FrameSchedule,
    cmd: CommandList,
    bundle: &EffectResources,
    input: &Arc<Texture>,
    history: &Arc<Texture>,
    output: &Arc<Texture>,
) {
    record_effect(schedule, cmd, "temporal_aa", Some(bundle), &[input, history], Some(output), &[]);
}

/// Temporal upscaler: internal-resolution `input` to display-resolution `output`.
pub fn fsr2_upscale(
    schedule: &FrameSchedule,
    cmd: CommandList,
    bundle: &EffectResources,
    input: &Arc<Texture>,
    depth: &Arc<Texture>,
    velocity: Option<&Arc<Texture>>,
    output: &Arc<Texture>,
    sharpness: f32,
) {
    let mut inputs = vec![input, depth];
    inputs.extend(velocity);
    record_effect(
        schedule,
        cmd,
        "fsr2",
        Some(bundle),
        &inputs,
        Some(output),
        &[("sharpness", sharpness)],
    );
}

/// Spatial upscaler with sharpening.
pub fn fsr_upscale(schedule: &FrameSchedule, cmd: CommandList, input: &Arc<Texture>, output: &Arc<Texture>, sharpness: f32) {
    record_effect(schedule, cmd, "fsr", None, &[input], Some(output), &[("sharpness", sharpness)]);
}

/// Depth of field parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthOfFieldParams {
    pub focus: f32,
    pub scale: f32,
    pub aspect: f32,
}

pub fn depth_of_field(
    schedule: &FrameSchedule,
    cmd: CommandList,
    bundle: &EffectResources,
    input: &Arc<Texture>,
    output: &Arc<Texture>,
    params: DepthOfFieldParams,
) {
    record_effect(
        schedule,
        cmd,
        "depth_of_field",
        Some(bundle),
        &[input],
        Some(output),
        &[("focus", params.focus), ("scale", params.scale), ("aspect", params.aspect)],
    );
}

pub fn motion_blur(
    schedule: &FrameSchedule,
    cmd: CommandList,
    bundle: &EffectResources,
    input: &Arc<Texture>,
    velocity: Option<&Arc<Texture>>,
    output: &Arc<Texture>,
    strength: f32,
) {
    let mut inputs = vec![input];
    inputs.extend(velocity);
    record_effect(
        schedule,
        cmd,
        "motion_blur",
        Some(bundle),
        &inputs,
        Some(output),
        &[("strength", strength)],
    );
}

/// Measure average luminance of `input` for exposure adaption.
pub fn eye_adaption(schedule: &FrameSchedule, cmd: CommandList, bundle: &EffectResources, input: &Arc<Texture>, rate: f32) {
    record_effect(schedule, cmd, "eye_adaption", Some(bundle), &[input], None, &[("rate", rate)]);
}

/// Extract and blur bright regions of `input` into the bloom bundle.
pub fn bloom(schedule: &FrameSchedule, cmd: CommandList, bundle: &EffectResources, input: &Arc<Texture>, threshold: f32) {
    record_effect(
        schedule,
        cmd,
        "bloom",
        Some(bundle),
        &[input],
        None,
        &[("threshold", threshold)],
    );
}

/// Tonemap parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TonemapParams {
    pub exposure: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub dither: bool,
}

impl Default for TonemapParams {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            dither: true,
        }
    }
}

/// Map HDR `input` to display range, applying optional exposure, bloom and distortion.
pub fn tonemap(
    schedule: &FrameSchedule,
    cmd: CommandList,
    input: &Arc<Texture>,
    extra_inputs: &[&Arc<Texture>],
    output: &Arc<Texture>,
    params: TonemapParams,
) {
    let mut inputs = vec![input];
    inputs.extend_from_slice(extra_inputs);
    record_effect(
        schedule,
        cmd,
        "tonemap",
        None,
        &inputs,
        Some(output),
        &[
            ("exposure", params.exposure),
            ("brightness", params.brightness),
            ("contrast", params.contrast),
            ("saturation", params.saturation),
            ("dither", if params.dither { 1.0 } else { 0.0 }),
        ],
    );
}

/// Single-input full-screen filter (sharpen, FXAA, chromatic aberration, CRT,
/// underwater, custom stages).
pub fn filter(
    schedule: &FrameSchedule,
    cmd: CommandList,
    name: &'static str,
    input: &Arc<Texture>,
    output: &Arc<Texture>,
    amount: f32,
) {
    record_effect(schedule, cmd, name, None, &[input], Some(output), &[("amount", amount)]);
}

/// Downsample `input` into `output`.
pub fn downsample(schedule: &FrameSchedule, cmd: CommandList, input: &Arc<Texture>, output: &Arc<Texture>) {
    record_effect(schedule, cmd, "downsample", None, &[input], Some(output), &[]);
}

/// Separable gaussian blur of `input` into `output` using `temp`.
pub fn gaussian_blur(
    schedule: &FrameSchedule,
    cmd: CommandList,
    input: &Arc<Texture>,
    temp: &Arc<Texture>,
    output: &Arc<Texture>,
) {
    record_effect(schedule, cmd, "gaussian_blur", None, &[input, temp], Some(output), &[]);
}

/// Generate the mip chain of `texture`.
pub fn generate_mips(schedule: &FrameSchedule, cmd: CommandList, texture: &Arc<Texture>) {
    record_effect(
        schedule,
        cmd,
        "generate_mips",
        None,
        &[],
        Some(texture),
        &[("mips", texture.mip_level_count() as f32)],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCapabilities, GraphicsDevice};
    use crate::scheduler::QueueType;
    use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

    fn texture(device: &Arc<GraphicsDevice>, label: &str) -> Arc<Texture> {
        device
            .create_texture(
                &TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba16Float, TextureUsage::SAMPLED_STORAGE)
                    .with_label(label),
            )
            .unwrap()
    }

    #[test]
    fn test_record_effect_wraps_in_event_and_barriers() {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let input = texture(&device, "in");
        let output = texture(&device, "out");

        let mut schedule = FrameSchedule::new();
        let cmd = schedule.begin_command_list("post", QueueType::Graphics);
        tonemap(&schedule, cmd, &input, &[], &output, TonemapParams::default());
        let report = schedule.submit().unwrap();

        let commands = &report.lists()[0].commands;
        assert_eq!(commands.len(), 5);
        assert!(matches!(commands[0], Command::BeginEvent("tonemap")));
        assert!(matches!(commands[1], Command::Barrier(Barrier::Image { .. })));
        assert_eq!(commands[2].effect_param("exposure"), Some(1.0));
        assert!(matches!(commands[4], Command::EndEvent));
        assert_eq!(report.effects(), vec!["tonemap"]);
    }

    #[test]
    fn test_effect_without_output_skips_barriers() {
        let device = GraphicsDevice::new("Dummy Adapter", DeviceCapabilities::default());
        let input = texture(&device, "in");

        let mut schedule = FrameSchedule::new();
        let cmd = schedule.begin_command_list("post", QueueType::Graphics);
        record_effect(&schedule, cmd, "luminance", None, &[&input], None, &[]);
        assert_eq!(schedule.command_count(cmd), 3);
    }
}
