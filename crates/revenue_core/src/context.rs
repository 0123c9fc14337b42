//! One-time bootstrap of the shared, read-only core state

use std::sync::Arc;

use tracing::{info, instrument};

use crate::aggregation::AggregationEngine;
use crate::config::{DatasetSource, RevenueConfig};
use crate::dataset::Dataset;
use crate::errors::Result;
use crate::gbdt::ModelHandle;
use crate::prediction::PredictionService;
use crate::schema::Schema;

/// Schema, model, dataset and the services built on them
#[derive(Debug, Clone)]
pub struct RevenueContext {
    schema: Arc<Schema>,
    model: Arc<ModelHandle>,
    dataset: Option<Arc<Dataset>>,
    prediction: PredictionService,
    aggregation: AggregationEngine,
}

impl RevenueContext {
    /// Load everything the configuration names and check it fits together.
    ///
    /// Any failure here is fatal for the host.
    #[instrument(skip_all)]
    pub fn bootstrap(config: &RevenueConfig) -> Result<Self> {
        let schema = match &config.schema.path {
            Some(path) => Schema::load(path)?,
            None => Schema::hotel_bookings()?,
        };
        let schema = Arc::new(schema);

        let model = Arc::new(ModelHandle::load(
            &config.model.path,
            config.model.expected_hash.as_deref(),
        )?);

        let dataset = match config.dataset.source()? {
            Some(DatasetSource::Csv(path)) => Some(Dataset::from_csv(path, &schema)?),
            Some(DatasetSource::Sqlite { path, table }) => {
                Some(Dataset::from_sqlite(path, table, &schema)?)
            }
            None => None,
        }
        .map(Arc::new);

        Self::from_parts(schema, model, dataset, config)
    }

    /// Assemble from already-loaded parts
    pub fn from_parts(
        schema: Arc<Schema>,
        model: Arc<ModelHandle>,
        dataset: Option<Arc<Dataset>>,
        config: &RevenueConfig,
    ) -> Result<Self> {
        let mut prediction = PredictionService::new(Arc::clone(&schema), Arc::clone(&model))?;
        if let Some(date) = config.encoding.reference_date {
            prediction = prediction.with_reference_date(date);
        }
        let aggregation = AggregationEngine::new(Arc::clone(&schema))?;

        info!(
            schema = schema.name(),
            schema_version = schema.version(),
            layout = %schema.layout().fingerprint(),
            model = %model.hash(),
            rows = dataset.as_ref().map(|d| d.len()).unwrap_or(0),
            "revenue context ready"
        );

        Ok(Self {
            schema,
            model,
            dataset,
            prediction,
            aggregation,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn dataset(&self) -> Option<&Arc<Dataset>> {
        self.dataset.as_ref()
    }

    pub fn prediction(&self) -> &PredictionService {
        &self.prediction
    }

    pub fn aggregation(&self) -> &AggregationEngine {
        &self.aggregation
    }
}
