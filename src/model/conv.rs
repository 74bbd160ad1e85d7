use burn::module::{Module, Param};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{activation, Distribution, ElementConversion, Int, Tensor};

/// One attention-convolution stage.
///
/// Computes node representations by weighting neighbor contributions with
/// learned attention coefficients over an edge list of shape `[2, E]`
/// (row 0: source nodes, row 1: destination nodes). The score for an edge
/// applies the nonlinearity before the attention vector, so the attention is
/// a function of both endpoints rather than a fixed ranking per source.
///
/// Head outputs are always concatenated: a stage with `heads` heads of
/// `channels` channels each produces `heads * channels` features per node.
#[derive(Module, Debug)]
pub struct Gatv2Conv<B: Backend> {
    lin_src: Linear<B>,
    lin_dst: Linear<B>,
    att: Param<Tensor<B, 3>>,
    dropout: Dropout,
    #[module(skip)]
    heads: usize,
    #[module(skip)]
    channels: usize,
    #[module(skip)]
    negative_slope: f64,
}

impl<B: Backend> Gatv2Conv<B> {
    /// `channels` is the output width of a single head.
    pub fn new(
        in_channels: usize,
        channels: usize,
        heads: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let lin_src = LinearConfig::new(in_channels, heads * channels).init(device);
        let lin_dst = LinearConfig::new(in_channels, heads * channels).init(device);

        // Xavier range for the attention vector
        let bound = (6.0 / (channels as f64 + 1.0)).sqrt();
        let att = Param::from_tensor(Tensor::random(
            [1, heads, channels],
            Distribution::Uniform(-bound, bound),
            device,
        ));

        Self {
            lin_src,
            lin_dst,
            att,
            dropout: DropoutConfig::new(dropout).init(),
            heads,
            channels,
            negative_slope: 0.2,
        }
    }

    /// Node features `[N, in_channels]` and edge index `[2, E]` to
    /// `[N, heads * channels]`. Nodes without incoming edges produce zero
    /// rows.
    pub fn forward(&self, x: Tensor<B, 2>, edge_index: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let device = x.device();
        let [num_nodes, _] = x.dims();
        let [_, num_edges] = edge_index.dims();
        let heads = self.heads;
        let channels = self.channels;

        if num_edges == 0 {
            return Tensor::zeros([num_nodes, heads * channels], &device);
        }

        let src = edge_index.clone().slice([0..1]).reshape([num_edges]);
        let dst = edge_index.slice([1..2]).reshape([num_edges]);

        let h_src = self
            .lin_src
            .forward(x.clone())
            .select(0, src)
            .reshape([num_edges, heads, channels]);
        let h_dst = self
            .lin_dst
            .forward(x)
            .select(0, dst.clone())
            .reshape([num_edges, heads, channels]);

        let scores = (activation::leaky_relu(h_src.clone() + h_dst, self.negative_slope)
            * self.att.val())
        .sum_dim(2)
        .reshape([num_edges, heads]);

        // A constant shift leaves each per-node softmax unchanged while
        // keeping every exponent non-positive.
        let shift: f64 = scores.clone().max().into_scalar().elem();
        let weights = scores.sub_scalar(shift).exp();

        let denom = Tensor::zeros([num_nodes, heads], &device)
            .select_assign(0, dst.clone(), weights.clone())
            .select(0, dst.clone())
            .clamp_min(1e-16);
        let alpha = self.dropout.forward(weights / denom);

        let messages =
            (h_src * alpha.reshape([num_edges, heads, 1])).reshape([num_edges, heads * channels]);

        Tensor::zeros([num_nodes, heads * channels], &device).select_assign(0, dst, messages)
    }

    pub fn heads(&self) -> usize {
        self.heads
    }

    /// Output width of a single head.
    pub fn head_channels(&self) -> usize {
        self.channels
    }

    /// Total output width: heads are concatenated.
    pub fn out_channels(&self) -> usize {
        self.heads * self.channels
    }
}
