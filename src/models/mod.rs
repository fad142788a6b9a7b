// 位置・仰角などの基本的なデータ型と数学ユーティリティ
pub mod common;

// モデルの基本インターフェース（trait）定義
pub mod traits;

// 各モデルの実装
pub mod orbit;
pub mod fov;
pub mod cdn_provider;
pub mod cdn_user;

// iname からモデルを生成するレジストリ
pub mod registry;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use orbit::OrbitModel;
pub use fov::FovWithElevation;
pub use cdn_provider::{ActiveSchedulingStrategy, CdnProvider, CdnProviderConfig, EvictionStrategy, HandleRequestsStrategy};
pub use cdn_user::{AccessGeneration, CdnUser, CdnUserConfig, CoverageStats, SchedulingStrategy};
pub use registry::{ModelFactory, ModelRegistry};
