// file: model.rs
// desc: convolutional classifier topology run by burn

use burn::{
    config::Config,
    module::Module,
    nn::{
        Linear, LinearConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    },
    tensor::{Tensor, activation::softmax, backend::Backend},
};

/// Serialized model description. The weights record only loads into a
/// classifier built from the same config.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub num_classes: usize,
    #[config(default = 3)]
    pub in_channels: usize,
    #[config(default = "vec![16, 32, 64]")]
    pub channels: Vec<usize>,
    #[config(default = 3)]
    pub kernel_size: usize,
}

impl ClassifierConfig {
    /// Rejects topologies that `init` or `forward` would panic on.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be positive".to_string());
        }
        if self.in_channels == 0 || self.channels.contains(&0) {
            return Err(format!(
                "channel counts must be positive (in {}, blocks {:?})",
                self.in_channels, self.channels
            ));
        }
        // same padding only exists for odd kernels
        if self.kernel_size % 2 == 0 {
            return Err(format!("kernel_size must be odd, got {}", self.kernel_size));
        }
        Ok(())
    }

    /// Smallest side length that survives every 2x2 max-pool.
    pub fn min_input_size(&self) -> u64 {
        u32::try_from(self.channels.len())
            .ok()
            .and_then(|blocks| 1u64.checked_shl(blocks))
            .unwrap_or(u64::MAX)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        let mut blocks = Vec::with_capacity(self.channels.len());
        let mut in_channels = self.in_channels;

        for &out_channels in &self.channels {
            blocks.push(ConvBlock {
                conv: Conv2dConfig::new(
                    [in_channels, out_channels],
                    [self.kernel_size, self.kernel_size],
                )
                .with_padding(PaddingConfig2d::Same)
                .init(device),
                pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
                activation: Relu::new(),
            });
            in_channels = out_channels;
        }

        Classifier {
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: LinearConfig::new(in_channels, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.activation.forward(x);
        self.pool.forward(x)
    }
}

/// Image classifier.
///
/// # Architecture
/// - {Conv kxk (same padding) + ReLU + MaxPool 2x2} per entry of `channels`
/// - global average pool
/// - Linear: last channel count -> num_classes
///
/// Any spatial size of at least `2^channels.len()` works since the head only
/// sees pooled channels.
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    pool: AdaptiveAvgPool2d,
    head: Linear<B>,
}

impl<B: Backend> Classifier<B> {
    /// `images`: [batch_size, channels, height, width] -> logits [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.pool.forward(x);
        let x = x.flatten::<2>(1, 3);
        self.head.forward(x)
    }

    /// Class probabilities, softmax over the class dimension.
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    pub fn num_classes(&self) -> usize {
        let [_, num_classes] = self.head.weight.dims();
        num_classes
    }

    /// Compares the parameter shapes actually held with those `config`
    /// describes. Loading a record does not check this.
    pub fn check_topology(&self, config: &ClassifierConfig) -> Result<(), String> {
        if self.blocks.len() != config.channels.len() {
            return Err(format!(
                "weights hold {} conv blocks, topology describes {}",
                self.blocks.len(),
                config.channels.len()
            ));
        }

        let mut in_channels = config.in_channels;
        for (i, (block, &out_channels)) in self.blocks.iter().zip(&config.channels).enumerate() {
            let expected = [out_channels, in_channels, config.kernel_size, config.kernel_size];
            let found = block.conv.weight.dims();
            if found != expected {
                return Err(format!(
                    "block {i}: weights are {found:?}, topology expects {expected:?}"
                ));
            }
            in_channels = out_channels;
        }

        let expected = [in_channels, config.num_classes];
        let found = self.head.weight.dims();
        if found != expected {
            return Err(format!("head: weights are {found:?}, topology expects {expected:?}"));
        }
        Ok(())
    }

    /// Zero head weights and the given bias, so every input yields `logits`.
    #[cfg(test)]
    pub(crate) fn with_fixed_logits(mut self, logits: &[f32]) -> Self {
        use burn::module::Param;

        let weight = self.head.weight.val();
        let device = weight.device();
        self.head.weight = Param::from_tensor(weight.zeros_like());
        self.head.bias = Some(Param::from_tensor(Tensor::from_floats(logits, &device)));
        self
    }
}
