//! A network of any family, selected at run time.

use std::path::Path;

use advbnn_core::WeightDraw;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::architecture::Architecture;
use crate::base::BaseNet;
use crate::bayesian::{FullBnn, RedBnn};
use crate::error::Result;
use crate::forward::LayerWeights;
use crate::settings::ModelType;
use crate::traits::LayeredNet;

/// Any of the three network families.
#[derive(Debug, Clone)]
pub enum Network<B: Backend> {
    /// Deterministic network.
    Base(BaseNet<B>),
    /// Fully Bayesian network.
    Full(FullBnn<B>),
    /// Last-layer Bayesian network.
    Red(RedBnn<B>),
}

impl<B: Backend> Network<B> {
    /// Family of the wrapped network.
    #[must_use]
    pub fn model_type(&self) -> ModelType {
        match self {
            Network::Base(_) => ModelType::BaseNN,
            Network::Full(_) => ModelType::FullBNN,
            Network::Red(_) => ModelType::RedBNN,
        }
    }

    /// Save the wrapped network under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn save(&self, dir: &Path) -> Result<()> {
        match self {
            Network::Base(net) => net.save(dir),
            Network::Full(net) => net.save(dir),
            Network::Red(net) => net.save(dir),
        }
    }

    fn inner(&self) -> &dyn LayeredNet<B> {
        match self {
            Network::Base(net) => net,
            Network::Full(net) => net,
            Network::Red(net) => net,
        }
    }
}

impl<B: AutodiffBackend> Network<B> {
    /// The same network on the inner backend, without gradient tracking.
    #[must_use]
    pub fn valid(&self) -> Network<B::InnerBackend> {
        match self {
            Network::Base(net) => Network::Base(net.valid()),
            Network::Full(net) => Network::Full(net.valid()),
            Network::Red(net) => Network::Red(net.valid()),
        }
    }
}

impl<B: Backend> LayeredNet<B> for Network<B> {
    fn architecture(&self) -> &Architecture {
        self.inner().architecture()
    }

    fn layer_weights(&self, draw: WeightDraw) -> Result<LayerWeights<B>> {
        self.inner().layer_weights(draw)
    }

    fn is_bayesian(&self) -> bool {
        self.inner().is_bayesian()
    }

    fn name(&self) -> String {
        self.inner().name()
    }
}

impl<B: Backend> From<BaseNet<B>> for Network<B> {
    fn from(net: BaseNet<B>) -> Self {
        Network::Base(net)
    }
}

impl<B: Backend> From<FullBnn<B>> for Network<B> {
    fn from(net: FullBnn<B>) -> Self {
        Network::Full(net)
    }
}

impl<B: Backend> From<RedBnn<B>> for Network<B> {
    fn from(net: RedBnn<B>) -> Self {
        Network::Red(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{base_settings, red_bnn_settings};
    use advbnn_core::{ImageShape, Seed};
    use burn_ndarray::NdArray;

    #[test]
    fn test_dispatch() {
        let device = Default::default();
        let base =
            BaseNet::<NdArray>::new(base_settings(2).unwrap(), ImageShape::new(1, 28, 28), 10, &device)
                .unwrap();
        let red: Network<NdArray> =
            RedBnn::new(base.clone(), red_bnn_settings(2).unwrap(), Seed::new(0)).unwrap().into();
        let base: Network<NdArray> = base.into();

        assert_eq!(base.model_type(), ModelType::BaseNN);
        assert!(!base.is_bayesian());
        assert!(red.is_bayesian());
        assert!(red.name().contains("redBNN_laplace"));
        assert_eq!(red.architecture(), base.architecture());
    }
}
