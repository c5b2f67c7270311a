//! Postprocess chain planning.
//!
//! The chain is a sequence of full-screen stages that alternate between two
//! scratch images. [`PingPong`] tracks which image is read and which is
//! written; only stages that actually run swap the pair. The plan is built
//! on the submitting thread before recording starts, so the final image is
//! known when the frame is submitted.

use super::settings::{CustomPostprocess, PostprocessOrder};
use super::targets::Rt;

/// Double buffer over two images plus an optional out-of-band source.
///
/// `first` holds an image produced outside the pair (the temporal AA
/// history). The next stage reads it instead of `read`, then it is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong<T> {
    read: T,
    write: T,
    first: Option<T>,
}

impl<T: Copy + PartialEq> PingPong<T> {
    pub fn new(read: T, write: T) -> Self {
        Self {
            read,
            write,
            first: None,
        }
    }

    /// Image the next stage reads.
    pub fn source(&self) -> T {
        self.first.unwrap_or(self.read)
    }

    /// Current read image of the pair.
    pub fn read(&self) -> T {
        self.read
    }

    /// Current write image of the pair.
    pub fn write(&self) -> T {
        self.write
    }

    /// Make `image` the source of the next stage without swapping.
    pub fn hold(&mut self, image: T) {
        self.first = Some(image);
    }

    /// Replace the pair.
    pub fn rebind(&mut self, read: T, write: T) {
        self.read = read;
        self.write = write;
        self.first = None;
    }

    /// Run one stage. Returns its `(input, output)` and swaps the pair, or
    /// returns `None` and leaves everything untouched when the stage is off.
    pub fn apply(&mut self, enabled: bool) -> Option<(T, T)> {
        if !enabled {
            return None;
        }
        let io = (self.source(), self.write);
        self.first = None;
        std::mem::swap(&mut self.read, &mut self.write);
        Some(io)
    }
}

/// An image the chain reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainImage {
    Target(Rt),
    /// Current temporal AA history texture.
    TemporalAaHistory,
}

impl ChainImage {
    pub fn target(self) -> Option<Rt> {
        match self {
            Self::Target(rt) => Some(rt),
            Self::TemporalAaHistory => None,
        }
    }
}

/// Postprocess effect of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostEffect {
    Fsr2,
    TemporalAa,
    Underwater,
    Custom(&'static str),
    DepthOfField,
    MotionBlur,
    EyeAdaption,
    Bloom,
    Tonemap,
    Sharpen,
    Fxaa,
    ChromaticAberration,
    Crt,
    Downsample,
    GaussianBlur,
    Fsr,
}

impl PostEffect {
    pub fn name(self) -> &'static str {
        match self {
            Self::Fsr2 => "fsr2",
            Self::TemporalAa => "temporal_aa",
            Self::Underwater => "underwater",
            Self::Custom(name) => name,
            Self::DepthOfField => "depth_of_field",
            Self::MotionBlur => "motion_blur",
            Self::EyeAdaption => "eye_adaption",
            Self::Bloom => "bloom",
            Self::Tonemap => "tonemap",
            Self::Sharpen => "sharpen",
            Self::Fxaa => "fxaa",
            Self::ChromaticAberration => "chromatic_aberration",
            Self::Crt => "crt",
            Self::Downsample => "downsample",
            Self::GaussianBlur => "gaussian_blur",
            Self::Fsr => "fsr",
        }
    }
}

/// One planned invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostStep {
    pub effect: PostEffect,
    pub input: ChainImage,
    /// `None` for analysis passes that only fill their own bundle.
    pub output: Option<ChainImage>,
    /// Scratch image used by the step.
    pub temp: Option<Rt>,
}

/// Which chain stages run this frame.
#[derive(Debug, Clone, Default)]
pub struct ChainInputs {
    pub fsr2: bool,
    pub temporal_aa: bool,
    pub underwater: bool,
    pub custom: Vec<CustomPostprocess>,
    pub depth_of_field: bool,
    pub motion_blur: bool,
    pub eye_adaption: bool,
    pub bloom: bool,
    pub sharpen: bool,
    pub fxaa: bool,
    pub chromatic_aberration: bool,
    pub crt: bool,
    pub gui_blur: bool,
    pub fsr: bool,
}

/// Ordered steps of the chain and its final image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostprocessPlan {
    steps: Vec<PostStep>,
    last: Rt,
}

impl PostprocessPlan {
    /// Plan the chain reading `rtMain` and writing into `rtPostprocess`.
    pub fn build(inputs: &ChainInputs) -> Self {
        let mut steps = Vec::new();
        let mut chain = PingPong::new(ChainImage::Target(Rt::Main), ChainImage::Target(Rt::Postprocess));

        let push = |steps: &mut Vec<PostStep>, effect, io: Option<(ChainImage, ChainImage)>| {
            if let Some((input, output)) = io {
                steps.push(PostStep {
                    effect,
                    input,
                    output: Some(output),
                    temp: None,
                });
            }
        };

        // HDR
        if inputs.fsr2 {
            steps.push(PostStep {
                effect: PostEffect::Fsr2,
                input: chain.source(),
                output: Some(ChainImage::Target(Rt::Fsr0)),
                temp: None,
            });
            chain.rebind(ChainImage::Target(Rt::Fsr0), ChainImage::Target(Rt::Fsr1));
        } else if inputs.temporal_aa {
            steps.push(PostStep {
                effect: PostEffect::TemporalAa,
                input: chain.source(),
                output: Some(ChainImage::TemporalAaHistory),
                temp: None,
            });
            chain.hold(ChainImage::TemporalAaHistory);
        }
        push(&mut steps, PostEffect::Underwater, chain.apply(inputs.underwater));
        for custom in inputs.custom.iter().filter(|c| c.order == PostprocessOrder::BeforeTonemap) {
            push(&mut steps, PostEffect::Custom(custom.name), chain.apply(custom.enabled));
        }
        push(&mut steps, PostEffect::DepthOfField, chain.apply(inputs.depth_of_field));
        push(&mut steps, PostEffect::MotionBlur, chain.apply(inputs.motion_blur));

        // Applied inside tonemap, not part of the pair.
        for (enabled, effect) in [
            (inputs.eye_adaption, PostEffect::EyeAdaption),
            (inputs.bloom, PostEffect::Bloom),
        ] {
            if enabled {
                steps.push(PostStep {
                    effect,
                    input: chain.source(),
                    output: None,
                    temp: None,
                });
            }
        }
        push(&mut steps, PostEffect::Tonemap, chain.apply(true));

        // LDR
        for custom in inputs.custom.iter().filter(|c| c.order == PostprocessOrder::AfterTonemap) {
            push(&mut steps, PostEffect::Custom(custom.name), chain.apply(custom.enabled));
        }
        push(&mut steps, PostEffect::Sharpen, chain.apply(inputs.sharpen));
        push(&mut steps, PostEffect::Fxaa, chain.apply(inputs.fxaa));
        push(
            &mut steps,
            PostEffect::ChromaticAberration,
            chain.apply(inputs.chromatic_aberration),
        );
        push(&mut steps, PostEffect::Crt, chain.apply(inputs.crt));

        let final_image = chain.read();
        let mut last = final_image.target().unwrap_or(Rt::Postprocess);

        if inputs.gui_blur {
            let gui = |rt| Some(ChainImage::Target(rt));
            steps.push(PostStep {
                effect: PostEffect::Downsample,
                input: final_image,
                output: gui(Rt::GuiBlur0),
                temp: None,
            });
            steps.push(PostStep {
                effect: PostEffect::Downsample,
                input: ChainImage::Target(Rt::GuiBlur0),
                output: gui(Rt::GuiBlur2),
                temp: None,
            });
            steps.push(PostStep {
                effect: PostEffect::GaussianBlur,
                input: ChainImage::Target(Rt::GuiBlur2),
                output: gui(Rt::GuiBlur2),
                temp: Some(Rt::GuiBlur1),
            });
        }

        if inputs.fsr && !inputs.fsr2 {
            steps.push(PostStep {
                effect: PostEffect::Fsr,
                input: final_image,
                output: Some(ChainImage::Target(Rt::Fsr0)),
                temp: Some(Rt::Fsr1),
            });
            last = Rt::Fsr0;
        }

        Self { steps, last }
    }

    pub fn steps(&self) -> &[PostStep] {
        &self.steps
    }

    /// Image holding the finished frame.
    pub fn last(&self) -> Rt {
        self.last
    }

    /// Effects in execution order.
    pub fn effects(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.effect.name()).collect()
    }

    /// Targets the chain reads, sorted and deduplicated.
    pub fn read_targets(&self) -> Vec<Rt> {
        let mut targets: Vec<Rt> = self
            .steps
            .iter()
            .flat_map(|s| [s.input.target(), s.temp])
            .flatten()
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    /// Targets the chain writes, sorted and deduplicated.
    pub fn written_targets(&self) -> Vec<Rt> {
        let mut targets: Vec<Rt> = self
            .steps
            .iter()
            .flat_map(|s| [s.output.and_then(ChainImage::target), s.temp])
            .flatten()
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }
}
