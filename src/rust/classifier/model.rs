use candle_core::{Device, Result, Tensor, D};
use candle_nn::rnn::LSTMState;
use candle_nn::{Embedding, LSTMConfig, Linear, Module, VarBuilder, VarMap, LSTM, RNN};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Half-width of the uniform range for embedding rows.
const EMBEDDING_INIT_RANGE: f32 = 0.05;

/// Shape of the embedding → LSTM → dense network.
///
/// Stored in `model.json` so a snapshot can rebuild the same graph before
/// loading its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Embedding table rows: vocabulary size plus the padding code
    pub input_size: usize,
    pub embedding_dim: usize,
    pub hidden_size: usize,
    pub num_classes: usize,
    pub dropout: f32,
    pub recurrent_dropout: f32,
    /// Fixed encoded length `L` the network was trained on
    pub sequence_length: usize,
}

/// Description of one layer, as written to `model.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescription {
    pub name: String,
    pub kind: String,
    /// Output shape with the batch dimension left out
    pub output_shape: Vec<usize>,
    pub parameters: usize,
}

impl ModelConfig {
    pub fn layers(&self) -> Vec<LayerDescription> {
        let (e, h, c) = (self.embedding_dim, self.hidden_size, self.num_classes);
        vec![
            LayerDescription {
                name: "embedding".into(),
                kind: "Embedding".into(),
                output_shape: vec![self.sequence_length, e],
                parameters: self.input_size * e,
            },
            LayerDescription {
                name: "lstm".into(),
                kind: "LSTM".into(),
                output_shape: vec![h],
                // input and recurrent kernels plus two bias vectors, four gates each
                parameters: 4 * h * (e + h) + 8 * h,
            },
            LayerDescription {
                name: "output".into(),
                kind: "Dense(softmax)".into(),
                output_shape: vec![c],
                parameters: h * c + c,
            },
        ]
    }

    pub fn parameter_count(&self) -> usize {
        self.layers().iter().map(|l| l.parameters).sum()
    }
}

/// Character-level recurrent classifier.
///
/// Returns logits; softmax is applied by the caller so training can use the
/// fused cross-entropy loss.
#[derive(Debug, Clone)]
pub(crate) struct PartNumberNet {
    embedding: Embedding,
    lstm: LSTM,
    output: Linear,
    embedding_dim: usize,
    hidden_size: usize,
    dropout: f32,
    recurrent_dropout: f32,
}

impl PartNumberNet {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let embedding = candle_nn::embedding(config.input_size, config.embedding_dim, vb.pp("embedding"))?;
        let lstm = candle_nn::lstm(
            config.embedding_dim,
            config.hidden_size,
            LSTMConfig::default(),
            vb.pp("lstm"),
        )?;
        let output = candle_nn::linear(config.hidden_size, config.num_classes, vb.pp("output"))?;
        Ok(Self {
            embedding,
            lstm,
            output,
            embedding_dim: config.embedding_dim,
            hidden_size: config.hidden_size,
            dropout: config.dropout,
            recurrent_dropout: config.recurrent_dropout,
        })
    }

    /// Logits for a `(batch, seq_len)` tensor of `u32` codes.
    ///
    /// Dropout is applied only when `rng` is given; its masks are drawn from it.
    pub fn forward_t(&self, ids: &Tensor, rng: Option<&mut StdRng>) -> Result<Tensor> {
        let hidden = self.hidden_states(ids, rng)?;
        match hidden.last() {
            Some(h) => self.output.forward(h),
            None => candle_core::bail!("cannot classify an empty sequence"),
        }
    }

    /// Logits after every time step, shape `(batch, seq_len, classes)`.
    pub fn forward_steps(&self, ids: &Tensor) -> Result<Tensor> {
        let hidden = self.hidden_states(ids, None)?;
        let logits = hidden
            .iter()
            .map(|h| self.output.forward(h))
            .collect::<Result<Vec<_>>>()?;
        Tensor::stack(&logits, 1)
    }

    /// Class probabilities for the final step.
    pub fn probabilities(&self, ids: &Tensor) -> Result<Tensor> {
        let logits = self.forward_t(ids, None)?;
        candle_nn::ops::softmax(&logits, D::Minus1)
    }

    fn hidden_states(&self, ids: &Tensor, rng: Option<&mut StdRng>) -> Result<Vec<Tensor>> {
        let (batch, seq_len) = ids.dims2()?;
        let embedded = self.embedding.forward(ids)?;
        let device = ids.device();

        // One mask per sequence, shared by every time step.
        let (input_mask, recurrent_mask) = match rng {
            Some(rng) => (
                dropout_mask(batch, self.embedding_dim, self.dropout, rng, device)?,
                dropout_mask(batch, self.hidden_size, self.recurrent_dropout, rng, device)?,
            ),
            None => (None, None),
        };

        let mut state = self.lstm.zero_state(batch)?;
        let mut hidden = Vec::with_capacity(seq_len);
        for t in 0..seq_len {
            let mut x = embedded.narrow(1, t, 1)?.squeeze(1)?.contiguous()?;
            if let Some(mask) = &input_mask {
                x = x.mul(mask)?;
            }
            let prev = match &recurrent_mask {
                Some(mask) => LSTMState::new(state.h().mul(mask)?, state.c().clone()),
                None => state.clone(),
            };
            state = self.lstm.step(&x, &prev)?;
            hidden.push(state.h().clone());
        }
        Ok(hidden)
    }
}

/// Inverted dropout mask: kept units are scaled by `1 / (1 - rate)`.
fn dropout_mask(batch: usize, width: usize, rate: f32, rng: &mut StdRng, device: &Device) -> Result<Option<Tensor>> {
    if rate <= 0.0 {
        return Ok(None);
    }
    let scale = 1.0 / (1.0 - rate);
    let mask: Vec<f32> = (0..batch * width)
        .map(|_| if rng.random::<f32>() < rate { 0.0 } else { scale })
        .collect();
    Tensor::from_vec(mask, (batch, width), device).map(Some)
}

/// Overwrites every variable in `varmap` with values drawn from `rng`.
///
/// Variables are visited in name order so the same seed always yields the same
/// weights. Embedding rows are uniform in `±0.05`, kernels are Glorot uniform,
/// and biases start at zero except the LSTM forget gate, which starts at one.
pub(crate) fn init_weights(varmap: &VarMap, rng: &mut StdRng) -> Result<()> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| candle_core::Error::Msg("variable map lock poisoned".into()))?;
    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();
    for name in names {
        let var = &vars[name];
        let dims = var.dims().to_vec();
        let values = initial_values(name, &dims, rng);
        var.set(&Tensor::from_vec(values, dims, var.device())?)?;
    }
    Ok(())
}

fn initial_values(name: &str, dims: &[usize], rng: &mut StdRng) -> Vec<f32> {
    let count: usize = dims.iter().product();
    if name.contains("bias") {
        let mut values = vec![0.0; count];
        // candle orders the LSTM gates input, forget, cell, output
        if name.starts_with("lstm.bias_ih") {
            let hidden = count / 4;
            values[hidden..2 * hidden].fill(1.0);
        }
        return values;
    }
    let limit = if name.starts_with("embedding") {
        EMBEDDING_INIT_RANGE
    } else {
        let fan: usize = dims.iter().sum();
        (6.0 / fan.max(1) as f32).sqrt()
    };
    (0..count).map(|_| rng.random_range(-limit..limit)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use rand::SeedableRng;

    fn config() -> ModelConfig {
        ModelConfig {
            input_size: 10,
            embedding_dim: 8,
            hidden_size: 6,
            num_classes: 3,
            dropout: 0.2,
            recurrent_dropout: 0.2,
            sequence_length: 5,
        }
    }

    #[test]
    fn test_output_shapes() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let net = PartNumberNet::new(&config(), vb)?;

        let ids = Tensor::new(&[[1u32, 2, 3, 0, 0], [4, 5, 6, 7, 0]], &Device::Cpu)?;
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(net.forward_t(&ids, Some(&mut rng))?.dims(), &[2, 3]);
        assert_eq!(net.forward_steps(&ids)?.dims(), &[2, 5, 3]);

        let probs = net.probabilities(&ids)?.to_vec2::<f32>()?;
        for row in probs {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_inference_is_deterministic() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let net = PartNumberNet::new(&config(), vb)?;
        let ids = Tensor::new(&[[1u32, 2, 3, 0, 0]], &Device::Cpu)?;
        let a = net.probabilities(&ids)?.to_vec2::<f32>()?;
        let b = net.probabilities(&ids)?.to_vec2::<f32>()?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_parameter_count_matches_varmap() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let _net = PartNumberNet::new(&config(), vb)?;
        let total: usize = varmap.all_vars().iter().map(|v| v.elem_count()).sum();
        assert_eq!(total, config().parameter_count());
        Ok(())
    }

    #[test]
    fn test_seeded_init_is_reproducible() -> Result<()> {
        let weights = |seed: u64| -> Result<Vec<(String, Vec<f32>)>> {
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
            let _net = PartNumberNet::new(&config(), vb)?;
            init_weights(&varmap, &mut StdRng::seed_from_u64(seed))?;
            let vars = varmap.data().lock().unwrap();
            let mut named: Vec<(String, Vec<f32>)> = vars
                .iter()
                .map(|(name, var)| -> Result<(String, Vec<f32>)> {
                    Ok((name.clone(), var.flatten_all()?.to_vec1::<f32>()?))
                })
                .collect::<Result<_>>()?;
            named.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(named)
        };
        assert_eq!(weights(7)?, weights(7)?);
        assert_ne!(weights(7)?, weights(8)?);

        let named = weights(7)?;
        let (_, bias) = named.iter().find(|(name, _)| name == "lstm.bias_ih_l0").unwrap();
        assert_eq!(&bias[6..12], &[1.0; 6]);
        assert!(bias[..6].iter().all(|&b| b == 0.0));
        Ok(())
    }

    #[test]
    fn test_seeded_dropout_is_reproducible() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let net = PartNumberNet::new(&config(), vb)?;
        let ids = Tensor::new(&[[1u32, 2, 3, 4, 0]], &Device::Cpu)?;
        let a = net.forward_t(&ids, Some(&mut StdRng::seed_from_u64(3)))?.to_vec2::<f32>()?;
        let b = net.forward_t(&ids, Some(&mut StdRng::seed_from_u64(3)))?.to_vec2::<f32>()?;
        assert_eq!(a, b);
        Ok(())
    }
}
