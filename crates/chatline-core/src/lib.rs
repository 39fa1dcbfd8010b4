pub mod cache;
pub mod engine;
pub mod error;
pub mod persona;
pub mod pipeline;
pub mod session;
pub mod share;
pub mod title;

pub use cache::{CacheBackend, CacheError, CacheService, CacheSettings, MemoryCache, RedisCache, UnavailableCache};
pub use engine::{ChunkSink, ConversationEngine};
pub use error::{ChatError, Result};
pub use persona::{Persona, PersonaCatalog};
pub use pipeline::{ChatPipeline, PipelineConfig, SendRequest, StreamUnit};
pub use session::{EngineHandle, SessionManager};
pub use share::ShareService;
pub use title::{derive_title, TitleJob, TitleQueue, TitleQueueStats};
