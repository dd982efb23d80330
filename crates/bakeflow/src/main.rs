mod docker;

use bakeflow_build::{BuildMetadata, DockerBuilder, RunOptions, run_build};
use bakeflow_core::Bakefile;
use clap::Parser;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bake")]
#[command(about = "依存を解いて、並べて、焼く。複数イメージの並行ビルド。", long_about = None)]
#[command(version)]
struct Cli {
    /// ビルド定義ファイル（`-` で標準入力から読み込み）
    #[arg(short = 'f', long = "file", default_value = "docker-bake.json")]
    file: PathBuf,
    /// キャッシュを使用せずにビルドする
    #[arg(long)]
    no_cache: bool,
    /// ビルド結果のメタデータを書き出すファイル
    #[arg(long)]
    metadata_file: Option<PathBuf>,
    /// 同時に実行するビルドステージ数（0 = 無制限）
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,
    /// 最初のエラーで実行中のビルドを中断する
    #[arg(long)]
    fail_fast: bool,
    /// ビルドするターゲット/グループ名（省略時は "default"）
    targets: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    tracing::debug!(file = %cli.file.display(), jobs = cli.jobs, "parsed command line");

    let (mut bakefile, dir) = load_manifest(&cli.file)?;

    if cli.no_cache {
        // 全ターゲットのキャッシュを無効化
        for target in bakefile.targets.values_mut() {
            target.no_cache = true;
        }
    }

    let targets = if cli.targets.is_empty() {
        vec!["default".to_string()]
    } else {
        cli.targets.clone()
    };

    println!("{}", "ターゲットをビルド中...".green());
    for name in &targets {
        println!("  • {}", name.cyan());
    }

    println!();
    println!("{}", "Dockerに接続中...".blue());
    let docker_conn = docker::init_docker_with_error_handling().await?;
    let builder = Arc::new(DockerBuilder::new(docker_conn));

    let options = RunOptions {
        dir,
        jobs: cli.jobs,
        fail_fast: cli.fail_fast,
    };

    let metadata = match run_build(&bakefile, &targets, builder, &options).await {
        Ok(metadata) => metadata,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "✗".red().bold(), e.user_message());
            std::process::exit(1);
        }
    };

    // 結果サマリー
    println!();
    println!(
        "{}",
        "✓ すべてのターゲットがビルドされました！".green().bold()
    );
    println!();
    println!("{}", "結果サマリー:".bold());
    for (name, meta) in &metadata {
        match &meta.digest {
            Some(digest) => println!("  {} {}: {}", "✓".green(), name, digest.cyan()),
            None => println!("  {} {}", "✓".green(), name),
        }
    }

    if let Some(path) = &cli.metadata_file {
        write_metadata_file(path, &metadata)?;
        println!();
        println!(
            "メタデータを書き出しました: {}",
            path.display().to_string().cyan()
        );
    }

    Ok(())
}

/// マニフェストをロードして相対パス解決の基準ディレクトリを決定する
fn load_manifest(file: &Path) -> anyhow::Result<(Bakefile, PathBuf)> {
    if file == Path::new("-") {
        // 標準入力から読む場合の基準ディレクトリはカレントディレクトリ
        let bakefile = bakeflow_core::decode_bakefile(std::io::stdin().lock())?;
        Ok((bakefile, PathBuf::new()))
    } else {
        let bakefile = bakeflow_core::load_bakefile(file)?;
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok((bakefile, dir))
    }
}

/// ビルド結果メタデータをJSONファイルへ書き出す
fn write_metadata_file(
    path: &Path,
    metadata: &BTreeMap<String, BuildMetadata>,
) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), metadata)?;
    Ok(())
}
