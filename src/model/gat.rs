use burn::constant;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{activation, Int, Tensor};

use super::conv::Gatv2Conv;
use crate::config::{GatConfig, JumpingKnowledge, StageOptions};

constant!(GatConfig);

/// Builds the ordered attention stage sequence for a layer configuration.
///
/// Stage 0 maps `in_channels` to `hidden_channels / heads` per head; every
/// later stage maps `hidden_channels` to the same per-head width, so head
/// concatenation reconstructs `hidden_channels` after each stage. The
/// `concat` option is discarded here and never reaches stage construction.
pub fn build_stages<B: Backend>(
    in_channels: usize,
    hidden_channels: usize,
    num_layers: usize,
    options: &StageOptions,
    device: &B::Device,
) -> Vec<Gatv2Conv<B>> {
    assert!(num_layers > 0, "num_layers must be > 0");
    assert!(options.heads > 0, "heads must be > 0");
    assert!(
        hidden_channels % options.heads == 0,
        "hidden_channels must be divisible by heads"
    );

    let per_head = hidden_channels / options.heads;
    let mut stages = Vec::with_capacity(num_layers);
    stages.push(Gatv2Conv::new(
        in_channels,
        per_head,
        options.heads,
        options.dropout,
        device,
    ));
    for _ in 1..num_layers {
        stages.push(Gatv2Conv::new(
            hidden_channels,
            per_head,
            options.heads,
            options.dropout,
            device,
        ));
    }
    stages
}

/// GATv2 model over a node-feature matrix and an edge list.
///
/// Owns the attention stage sequence plus the glue around it: SiLU
/// activation and dropout after every stage, optional per-stage layer
/// normalization, a jumping-knowledge policy combining per-stage outputs,
/// and an optional linear projection to `out_channels`.
#[derive(Module, Debug)]
pub struct Gat2Model<B: Backend> {
    #[module(skip)]
    config: GatConfig,
    convs: Vec<Gatv2Conv<B>>,
    norms: Option<Vec<LayerNorm<B>>>,
    dropout: Dropout,
    proj: Option<Linear<B>>,
}

impl<B: Backend> Gat2Model<B> {
    pub fn new(config: GatConfig, device: &B::Device) -> Self {
        config.validate();

        let convs = build_stages(
            config.in_channels,
            config.hidden_channels,
            config.num_layers,
            &config.stage_options(),
            device,
        );

        let norms = config.layer_norm.then(|| {
            (0..config.num_layers)
                .map(|_| LayerNormConfig::new(config.hidden_channels).init(device))
                .collect()
        });

        let jk_width = match config.jk {
            JumpingKnowledge::Cat => config.hidden_channels * config.num_layers,
            JumpingKnowledge::Last | JumpingKnowledge::Max => config.hidden_channels,
        };
        let proj = config
            .out_channels
            .map(|out| LinearConfig::new(jk_width, out).init(device));

        let dropout = DropoutConfig::new(config.dropout).init();

        Self {
            config,
            convs,
            norms,
            dropout,
            proj,
        }
    }

    /// Node features `[N, in_channels]` and edge index `[2, E]` to
    /// `[N, out_channels]` (or the aggregated width when no output
    /// projection is configured).
    pub fn forward(&self, x: Tensor<B, 2>, edge_index: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let mut h = x;
        let mut jk_cat: Vec<Tensor<B, 2>> = Vec::new();
        let mut jk_max: Option<Tensor<B, 2>> = None;

        for (idx, conv) in self.convs.iter().enumerate() {
            h = conv.forward(h, edge_index.clone());
            if let Some(norms) = &self.norms {
                h = norms[idx].forward(h);
            }
            h = activation::silu(h);
            h = self.dropout.forward(h);

            match self.config.jk {
                JumpingKnowledge::Last => {}
                JumpingKnowledge::Cat => jk_cat.push(h.clone()),
                JumpingKnowledge::Max => {
                    jk_max = Some(match jk_max.take() {
                        Some(acc) => acc.max_pair(h.clone()),
                        None => h.clone(),
                    });
                }
            }
        }

        let out = match self.config.jk {
            JumpingKnowledge::Last => h,
            JumpingKnowledge::Cat => Tensor::cat(jk_cat, 1),
            JumpingKnowledge::Max => jk_max.unwrap_or(h),
        };

        match &self.proj {
            Some(proj) => proj.forward(out),
            None => out,
        }
    }

    pub fn config(&self) -> &GatConfig {
        &self.config
    }

    pub fn stages(&self) -> &[Gatv2Conv<B>] {
        &self.convs
    }

    pub fn num_stages(&self) -> usize {
        self.convs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn chain_edges(
        device: &<TestBackend as Backend>::Device,
        n: usize,
    ) -> Tensor<TestBackend, 2, Int> {
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for i in 0..n as i64 - 1 {
            src.push(i);
            dst.push(i + 1);
            src.push(i + 1);
            dst.push(i);
        }
        let src = Tensor::<TestBackend, 1, Int>::from_ints(src.as_slice(), device);
        let dst = Tensor::<TestBackend, 1, Int>::from_ints(dst.as_slice(), device);
        Tensor::stack::<2>(vec![src, dst], 0)
    }

    fn config(hidden: usize, layers: usize, heads: usize) -> GatConfig {
        GatConfig {
            in_channels: 1,
            hidden_channels: hidden,
            num_layers: layers,
            out_channels: Some(1),
            dropout: 0.0,
            heads,
            jk: JumpingKnowledge::Last,
            layer_norm: false,
        }
    }

    #[test]
    fn stage_sequence_has_expected_widths() {
        let device = Default::default();
        let model = Gat2Model::<TestBackend>::new(config(32, 3, 8), &device);

        assert_eq!(model.num_stages(), 3);
        for stage in model.stages() {
            assert_eq!(stage.head_channels(), 4);
            assert_eq!(stage.out_channels(), 32);
        }
    }

    #[test]
    #[should_panic(expected = "divisible by heads")]
    fn indivisible_configuration_fails_before_any_stage() {
        let device = Default::default();
        let _ = Gat2Model::<TestBackend>::new(config(30, 2, 8), &device);
    }

    #[test]
    fn concat_option_is_discarded() {
        let device = Default::default();
        let mut options = StageOptions::new(4, 0.0);
        options.concat = Some(false);

        // Were `concat` forwarded, a false value would average heads and the
        // stage output would shrink to the per-head width.
        let stages = build_stages::<TestBackend>(3, 16, 2, &options, &device);
        assert_eq!(stages.len(), 2);
        for stage in &stages {
            assert_eq!(stage.out_channels(), 16);
        }
    }

    #[test]
    fn forward_projects_to_out_channels() {
        let device = Default::default();
        let model = Gat2Model::<TestBackend>::new(config(8, 2, 2), &device);
        let x = Tensor::random([6, 1], Distribution::Uniform(-1.0, 1.0), &device);

        let out = model.forward(x, chain_edges(&device, 6));
        assert_eq!(out.dims(), [6, 1]);
    }

    #[test]
    fn jk_cat_widens_unprojected_output() {
        let device = Default::default();
        let mut cfg = config(8, 3, 2);
        cfg.jk = JumpingKnowledge::Cat;
        cfg.out_channels = None;
        let model = Gat2Model::<TestBackend>::new(cfg, &device);
        let x = Tensor::random([4, 1], Distribution::Uniform(-1.0, 1.0), &device);

        let out = model.forward(x, chain_edges(&device, 4));
        assert_eq!(out.dims(), [4, 24]);
    }

    #[test]
    fn jk_max_keeps_hidden_width() {
        let device = Default::default();
        let mut cfg = config(8, 3, 2);
        cfg.jk = JumpingKnowledge::Max;
        cfg.out_channels = None;
        let model = Gat2Model::<TestBackend>::new(cfg, &device);
        let x = Tensor::random([4, 1], Distribution::Uniform(-1.0, 1.0), &device);

        let out = model.forward(x, chain_edges(&device, 4));
        assert_eq!(out.dims(), [4, 8]);
    }

    #[test]
    fn layer_norm_stages_match_layer_count() {
        let device = Default::default();
        let mut cfg = config(8, 2, 2);
        cfg.layer_norm = true;
        let model = Gat2Model::<TestBackend>::new(cfg, &device);
        let x = Tensor::random([5, 1], Distribution::Uniform(-1.0, 1.0), &device);

        let out = model.forward(x, chain_edges(&device, 5));
        assert_eq!(out.dims(), [5, 1]);
    }
}
