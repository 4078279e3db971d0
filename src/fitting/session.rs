//! # Fitting session facade
//!
//! Bundles the compiler, dataset, equation and method selection behind
//! the flow a host UI drives: set the equation, look up its parameters,
//! supply initial estimates, run, read results. Equivalent fits reuse the
//! compiled model through the session's cache.

use std::sync::Arc;

use crate::fitting::data::Dataset;
use crate::fitting::dispatcher::{FitMethod, FitOptions, fit};
use crate::fitting::error::{FitError, ModelError};
use crate::fitting::model::{ModelCompiler, NumericModel};
use crate::fitting::result::FitResult;
use crate::fitting::statistics::FitStatistics;
use crate::numerical::lm::FitProgress;

/// One curve-fitting workflow: equation + data + method.
pub struct FitSession {
    compiler: ModelCompiler,
    method: FitMethod,
    options: FitOptions,
    progress: FitProgress,
    dataset: Option<Dataset>,
    equation: Option<String>,
    model: Option<Arc<NumericModel>>,
    result: Option<(FitResult, FitStatistics)>,
}

impl Default for FitSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FitSession {
    pub fn new() -> Self {
        FitSession {
            compiler: ModelCompiler::new(),
            method: FitMethod::Odr,
            options: FitOptions::default(),
            progress: FitProgress::new(),
            dataset: None,
            equation: None,
            model: None,
            result: None,
        }
    }

    pub fn set_method(&mut self, method: FitMethod) {
        self.method = method;
    }

    pub fn set_options(&mut self, options: FitOptions) {
        self.options = options;
    }

    pub fn set_data(&mut self, dataset: Dataset) {
        self.dataset = Some(dataset);
        self.result = None;
    }

    /// Compile the equation (invalidating any previous model) and return
    /// its parameters in positional order, for the initial-guess vector.
    pub fn set_equation(&mut self, equation: &str) -> Result<Vec<String>, ModelError> {
        let parameters = self.compiler.extract_parameters(equation)?;
        let model = self.compiler.create_model(equation, &parameters)?;
        self.equation = Some(equation.to_string());
        self.model = Some(model);
        self.result = None;
        Ok(parameters)
    }

    /// Progress handle; clone it before `run` and poll from another
    /// thread while a slow fit (ODR, bootstrap) is in flight.
    pub fn progress(&self) -> FitProgress {
        self.progress.clone()
    }

    pub fn model(&self) -> Option<&Arc<NumericModel>> {
        self.model.as_ref()
    }

    pub fn result(&self) -> Option<&(FitResult, FitStatistics)> {
        self.result.as_ref()
    }

    /// Run the selected strategy with the given initial estimates.
    pub fn run(&mut self, initial: &[f64]) -> Result<&(FitResult, FitStatistics), FitError> {
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| FitError::InvalidInput("no dataset loaded".to_string()))?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| FitError::InvalidInput("no equation set".to_string()))?;
        self.progress.reset();
        let outcome =
            fit(self.method, dataset, model, initial, &self.options, Some(&self.progress))?;
        Ok(&*self.result.insert(outcome))
    }
}
