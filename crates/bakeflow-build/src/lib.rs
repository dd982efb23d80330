//! Bakeflow イメージビルド機能
//!
//! ターゲットごとの完了フューチャ、同時実行制御ゲート、ビルド要求の
//! 組み立て、並行スケジューリング、Docker daemonによるイメージビルドを
//! 提供します。

pub mod builder;
pub mod context;
pub mod error;
pub mod gate;
pub mod pending;
pub mod request;
pub mod scheduler;

pub use builder::{DockerBuilder, ImageBuilder};
pub use context::ContextBuilder;
pub use error::{BuildError, BuildResult};
pub use gate::JobGate;
pub use pending::{BuildMetadata, BuildOutput, PendingRegistry, PendingTarget, TargetOutcome};
pub use request::{
    AdditionalContext, BuildRequest, Containerfile, Platform, PullPolicy, prepare,
};
pub use scheduler::{RunOptions, run_build};
