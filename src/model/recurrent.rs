// Recurrent stack - ordered LSTM layers driven one time step at a time
//
// Each layer is described by a plain `RecurrentLayerSpec`; the stack owns
// the cells and their per-sequence state. State is created fresh for every
// forward call, so no memory leaks from one window into the next.

use candle_core::Tensor;
use candle_nn::{lstm, LSTMConfig, RNN, VarBuilder, LSTM};

use super::KeepProbability;
use crate::error::ModelError;

/// Input/output width of one recurrent layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrentLayerSpec {
    pub input_size: usize,
    pub hidden_size: usize,
}

/// Stacked LSTM cells
pub struct RecurrentStack {
    layers: Vec<LSTM>,
}

impl RecurrentStack {
    /// Create one LSTM per spec under `vb/layer{i}`
    pub fn new(specs: &[RecurrentLayerSpec], vb: VarBuilder) -> Result<Self, ModelError> {
        let layers = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                lstm(
                    spec.input_size,
                    spec.hidden_size,
                    LSTMConfig::default(),
                    vb.pp(format!("layer{i}")),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Run `(batch, frames, features)` through the stack in time order
    ///
    /// Dropout is applied to every layer's per-step input when `keep < 1`.
    ///
    /// # Returns
    /// Top-layer hidden state after the final time step, `(batch, hidden)`
    pub fn forward_last(&self, inputs: &Tensor, keep: KeepProbability) -> Result<Tensor, ModelError> {
        let (batch, frames, _) = inputs.dims3()?;
        let mut states = self
            .layers
            .iter()
            .map(|layer| layer.zero_state(batch))
            .collect::<candle_core::Result<Vec<_>>>()?;

        for t in 0..frames {
            let mut x = inputs.narrow(1, t, 1)?.squeeze(1)?;
            for (layer, state) in self.layers.iter().zip(states.iter_mut()) {
                if keep.is_dropout() {
                    x = candle_nn::ops::dropout(&x, keep.drop_rate())?;
                }
                *state = layer.step(&x, state)?;
                x = state.h().clone();
            }
        }

        states
            .last()
            .map(|state| state.h().clone())
            .ok_or_else(|| ModelError::invalid_config("recurrent stack has no layers"))
    }
}
