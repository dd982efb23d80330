//! Bakeファイルローダー
//!
//! ファイル読み込みとJSONデコードを統合

use crate::error::Result;
use crate::model::Bakefile;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// 指定されたパスからBakeファイルをロード
pub fn load_bakefile(path: &Path) -> Result<Bakefile> {
    debug!("Loading bake file: {}", path.display());
    let file = File::open(path)?;
    let bakefile = decode_bakefile(BufReader::new(file))?;
    info!(
        targets = bakefile.targets.len(),
        groups = bakefile.groups.len(),
        "Bake file loaded"
    );
    Ok(bakefile)
}

/// 任意のリーダーからBakeファイルをデコード（標準入力対応）
pub fn decode_bakefile(reader: impl Read) -> Result<Bakefile> {
    Ok(serde_json::from_reader(reader)?)
}
