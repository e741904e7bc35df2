use crate::error::Result;
use candle_core::Tensor;
use candle_nn::{linear, Dropout, Linear, Module, VarBuilder};

/// Feed-forward scorer: `depth` ReLU hidden layers followed by a linear output.
///
/// A depth of zero reduces to a single linear map.
#[derive(Debug, Clone)]
pub struct Mlp {
    hidden: Vec<Linear>,
    output: Linear,
    dropout: Dropout,
}

impl Mlp {
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        output_size: usize,
        depth: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut hidden = Vec::with_capacity(depth);
        let mut in_size = input_size;
        for layer in 0..depth {
            hidden.push(linear(in_size, hidden_size, vb.pp(format!("hidden_{layer}")))?);
            in_size = hidden_size;
        }
        let output = linear(in_size, output_size, vb.pp("output"))?;
        Ok(Self {
            hidden,
            output,
            dropout: Dropout::new(dropout),
        })
    }

    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut xs = xs.clone();
        for layer in &self.hidden {
            xs = layer.forward(&xs)?.relu()?;
            xs = self.dropout.forward(&xs, train)?;
        }
        Ok(self.output.forward(&xs)?)
    }
}
