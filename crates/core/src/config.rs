use crate::completion::{
    HuggingFaceModel, OpenAiChatModel, DEFAULT_CHAT_MODEL, DEFAULT_HUGGINGFACE_BASE_URL,
    DEFAULT_HUGGINGFACE_MODEL,
};
use crate::embeddings::{
    OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL,
};
use crate::error::ConfigError;
use crate::stores::pinecone::{ServerlessPlacement, DEFAULT_PINECONE_CONTROL_URL};
use crate::stores::{PineconeStore, QdrantStore};
use crate::traits::{CompletionModel, Embedder, VectorIndex};
use crate::{AnswerPipeline, DistanceMetric, IndexSpec, IngestionOptions, IngestionPipeline};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexProvider {
    Pinecone,
    Qdrant,
}

impl FromStr for IndexProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pinecone" => Ok(IndexProvider::Pinecone),
            "qdrant" => Ok(IndexProvider::Qdrant),
            other => Err(ConfigError::UnknownProvider {
                kind: "index",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionProvider {
    OpenAi,
    HuggingFace,
}

impl FromStr for CompletionProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(CompletionProvider::OpenAi),
            "huggingface" | "hf" => Ok(CompletionProvider::HuggingFace),
            other => Err(ConfigError::UnknownProvider {
                kind: "completion",
                value: other.to_string(),
            }),
        }
    }
}

/// Everything needed to reach the hosted services. Credentials are plain
/// strings here; the binary fills them from flags or the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub index_provider: IndexProvider,
    pub index_name: String,
    pub index_dimension: usize,
    pub index_metric: DistanceMetric,
    pub namespace: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub pinecone_control_url: String,
    pub pinecone_cloud: String,
    pub pinecone_region: String,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub embedding_model: String,
    pub completion_provider: CompletionProvider,
    pub chat_model: String,
    pub huggingface_token: Option<String>,
    pub huggingface_base_url: String,
    pub huggingface_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_provider: IndexProvider::Pinecone,
            index_name: "research-index".to_string(),
            index_dimension: DEFAULT_EMBEDDING_DIMENSIONS,
            index_metric: DistanceMetric::Cosine,
            namespace: None,
            pinecone_api_key: None,
            pinecone_control_url: DEFAULT_PINECONE_CONTROL_URL.to_string(),
            pinecone_cloud: "aws".to_string(),
            pinecone_region: "us-east-1".to_string(),
            qdrant_url: "http://localhost:6333".to_string(),
            qdrant_api_key: None,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            completion_provider: CompletionProvider::OpenAi,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            huggingface_token: None,
            huggingface_base_url: DEFAULT_HUGGINGFACE_BASE_URL.to_string(),
            huggingface_model: DEFAULT_HUGGINGFACE_MODEL.to_string(),
        }
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing { name })
}

fn invalid(name: &'static str) -> impl Fn(crate::ServiceError) -> ConfigError {
    move |error| ConfigError::Invalid {
        name,
        details: error.to_string(),
    }
}

impl Settings {
    /// Checks that every credential the selected providers need is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_name.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "PINECONE_INDEX_NAME",
            });
        }
        if self.index_dimension == 0 {
            return Err(ConfigError::Invalid {
                name: "PINECONE_INDEX_DIM",
                details: "dimension must be positive".to_string(),
            });
        }

        require(&self.openai_api_key, "OPENAI_API_KEY")?;
        if self.index_provider == IndexProvider::Pinecone {
            require(&self.pinecone_api_key, "PINECONE_API_KEY")?;
        }
        if self.completion_provider == CompletionProvider::HuggingFace {
            require(&self.huggingface_token, "HUGGINGFACEHUB_API_TOKEN")?;
        }
        Ok(())
    }

    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec {
            name: self.index_name.clone(),
            dimension: self.index_dimension,
            metric: self.index_metric,
        }
    }
}

/// Service handles built once at startup and shared by both pipelines.
#[derive(Clone)]
pub struct Services {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub completion: Arc<dyn CompletionModel>,
    pub index_spec: IndexSpec,
    pub namespace: Option<String>,
}

impl Services {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let openai_key = require(&settings.openai_api_key, "OPENAI_API_KEY")?;
        let embedder: Arc<dyn Embedder> = Arc::new(
            OpenAiEmbedder::new(
                &settings.openai_base_url,
                openai_key,
                settings.embedding_model.clone(),
                settings.index_dimension,
            )
            .map_err(invalid("OPENAI_BASE_URL"))?,
        );

        let index: Arc<dyn VectorIndex> = match settings.index_provider {
            IndexProvider::Pinecone => Arc::new(
                PineconeStore::new(
                    &settings.pinecone_control_url,
                    require(&settings.pinecone_api_key, "PINECONE_API_KEY")?,
                    settings.index_name.clone(),
                    ServerlessPlacement {
                        cloud: settings.pinecone_cloud.clone(),
                        region: settings.pinecone_region.clone(),
                    },
                )
                .map_err(invalid("PINECONE_CONTROL_URL"))?,
            ),
            IndexProvider::Qdrant => {
                let store = QdrantStore::new(&settings.qdrant_url, settings.index_name.clone())
                    .map_err(invalid("QDRANT_URL"))?;
                match settings.qdrant_api_key.as_deref() {
                    Some(key) if !key.trim().is_empty() => Arc::new(store.with_api_key(key)),
                    _ => Arc::new(store),
                }
            }
        };

        let completion: Arc<dyn CompletionModel> = match settings.completion_provider {
            CompletionProvider::OpenAi => Arc::new(
                OpenAiChatModel::new(
                    &settings.openai_base_url,
                    openai_key,
                    settings.chat_model.clone(),
                )
                .map_err(invalid("OPENAI_BASE_URL"))?,
            ),
            CompletionProvider::HuggingFace => Arc::new(
                HuggingFaceModel::new(
                    &settings.huggingface_base_url,
                    require(&settings.huggingface_token, "HUGGINGFACEHUB_API_TOKEN")?,
                    settings.huggingface_model.clone(),
                )
                .map_err(invalid("HUGGINGFACE_BASE_URL"))?,
            ),
        };

        Ok(Self {
            embedder,
            index,
            completion,
            index_spec: settings.index_spec(),
            namespace: settings.namespace.clone(),
        })
    }

    pub fn ingestion_pipeline(&self, options: IngestionOptions) -> IngestionPipeline {
        let options = IngestionOptions {
            namespace: options.namespace.or_else(|| self.namespace.clone()),
            ..options
        };
        IngestionPipeline::new(self.embedder.clone(), self.index.clone(), options)
    }

    pub fn answer_pipeline(&self) -> AnswerPipeline {
        AnswerPipeline::new(
            self.embedder.clone(),
            self.index.clone(),
            self.completion.clone(),
        )
        .with_namespace(self.namespace.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_settings() -> Settings {
        Settings {
            openai_api_key: Some("sk-test".to_string()),
            pinecone_api_key: Some("pc-test".to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn missing_openai_key_fails_validation() {
        let settings = Settings {
            openai_api_key: None,
            ..complete_settings()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Missing {
                name: "OPENAI_API_KEY"
            })
        ));
    }

    #[test]
    fn blank_pinecone_key_counts_as_missing() {
        let settings = Settings {
            pinecone_api_key: Some("   ".to_string()),
            ..complete_settings()
        };
        assert!(matches!(
            Services::from_settings(&settings).err(),
            Some(ConfigError::Missing {
                name: "PINECONE_API_KEY"
            })
        ));
    }

    #[test]
    fn qdrant_needs_no_pinecone_key() {
        let settings = Settings {
            index_provider: IndexProvider::Qdrant,
            pinecone_api_key: None,
            ..complete_settings()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn huggingface_requires_its_token() {
        let settings = Settings {
            completion_provider: CompletionProvider::HuggingFace,
            ..complete_settings()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Missing {
                name: "HUGGINGFACEHUB_API_TOKEN"
            })
        ));
    }

    #[test]
    fn services_build_with_complete_settings() {
        let services = Services::from_settings(&complete_settings()).unwrap();
        assert_eq!(services.index_spec.dimension, DEFAULT_EMBEDDING_DIMENSIONS);
        assert_eq!(services.embedder.dimensions(), DEFAULT_EMBEDDING_DIMENSIONS);
        assert_eq!(services.completion.model(), DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn provider_names_parse() {
        assert_eq!("Qdrant".parse::<IndexProvider>().ok(), Some(IndexProvider::Qdrant));
        assert_eq!(
            "hf".parse::<CompletionProvider>().ok(),
            Some(CompletionProvider::HuggingFace)
        );
        assert!("weaviate".parse::<IndexProvider>().is_err());
    }
}
