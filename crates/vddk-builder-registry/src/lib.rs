//! Registry Probe: イメージがレジストリに存在するかの確認
//!
//! マニフェストへの HEAD リクエストだけで判定するため、レイヤーは取得しません。
//! ビルドスロットには一切触れないので、ビルド中でも並行して問い合わせできます。

pub mod error;
pub mod probe;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::*;
pub use probe::*;
