use anyhow::Result;
use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};

use crate::data::{DataLoader, GraphBatch};
use crate::model::Gat2Model;

#[derive(Clone, Debug)]
pub struct TrainOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
}

impl<B: Backend> TrainOutput<B> {
    pub fn new(loss: Tensor<B, 1>) -> Self {
        Self { loss }
    }
}

/// Drives optimization of a [`Gat2Model`]: forward, MSE loss, backward,
/// Adam step. Epoch sequencing and stopping policy live with the caller.
pub struct GatTrainer<B: AutodiffBackend> {
    model: Gat2Model<B>,
    optimizer: OptimizerAdaptor<Adam, Gat2Model<B>, B>,
    loss_fn: MseLoss,
    lr: f64,
}

impl<B: AutodiffBackend> GatTrainer<B> {
    pub fn new(model: Gat2Model<B>, lr: f64) -> Self {
        let optimizer = AdamConfig::new().init::<B, Gat2Model<B>>();

        Self {
            model,
            optimizer,
            loss_fn: MseLoss::new(),
            lr,
        }
    }

    pub fn train_step(&mut self, batch: GraphBatch<B>) -> TrainOutput<B> {
        let prediction = self.model.forward(batch.features, batch.edge_index);
        let loss = self
            .loss_fn
            .forward(prediction, batch.targets, Reduction::Mean);

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optimizer.step(self.lr, self.model.clone(), grads);

        TrainOutput::new(loss)
    }

    /// Mean training loss over one pass of the loader.
    pub fn train_epoch(&mut self, loader: &mut dyn DataLoader<B>) -> Result<f64> {
        let mut total = 0.0;
        let mut batches = 0usize;
        while let Some(batch) = loader.next_batch()? {
            let output = self.train_step(batch);
            total += output.loss.into_scalar().elem::<f64>();
            batches += 1;
        }
        Ok(if batches > 0 {
            total / batches as f64
        } else {
            f64::NAN
        })
    }

    /// Mean loss over one pass of the loader, on the inner backend so
    /// dropout is inactive and no autodiff graph is built.
    pub fn validate(&self, loader: &mut dyn DataLoader<B::InnerBackend>) -> Result<f64> {
        let model = self.model.valid();
        let mut total = 0.0;
        let mut batches = 0usize;
        while let Some(batch) = loader.next_batch()? {
            let prediction = model.forward(batch.features, batch.edge_index);
            let loss = self
                .loss_fn
                .forward(prediction, batch.targets, Reduction::Mean);
            total += loss.into_scalar().elem::<f64>();
            batches += 1;
        }
        Ok(if batches > 0 {
            total / batches as f64
        } else {
            f64::NAN
        })
    }

    pub fn model(&self) -> &Gat2Model<B> {
        &self.model
    }

    pub fn into_model(self) -> Gat2Model<B> {
        self.model
    }
}
