pub mod artifacts;
pub mod browser;
pub mod capture;
pub mod config;
pub mod dom;
pub mod error;
pub mod extract;
pub mod food;
pub mod logging;
pub mod mask;
pub mod recorder;
pub mod retry;
pub mod run_id;
pub mod selector;
pub mod session;
pub mod summary;

//  Re-export commonly used items
pub use artifacts::{ArtifactPaths, ArtifactStore};
pub use browser::{BrowserEvent, ChromeDriver, LaunchOptions, PageHandle};
pub use capture::{PageRegistry, PageVisit};
pub use config::{CaptureConfig, RunMode};
pub use dom::{DomNode, DomSnapshot, PageSignals};
pub use error::{CaptureError, Result};
pub use extract::{ElementExtractor, ElementRecord};
pub use food::FoodDocument;
pub use mask::SensitiveValueMasker;
pub use recorder::{ActionEvent, ActionKind, ActionRecorder, ActionSummary};
pub use retry::RetryPolicy;
pub use run_id::RunIdentity;
pub use selector::{SelectorCandidate, SelectorCandidateGenerator, SelectorStrategy};
pub use session::{run_interact, run_snapshot, run_snapshot_until, RunContext};
pub use summary::{RunState, RunSummary, RunSummaryWriter};
