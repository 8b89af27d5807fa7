//! Demonstration driver for the hybrid retrieval engine.
//!
//! Loads a TOML configuration, ingests a mixed Chinese/English corpus into
//! both tiers, runs repeated query rounds to build access heat, and prints
//! per-query results and system statistics while the auto-tuner watches
//! observed latency.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fusedb_core::chunk::Chunk;
use fusedb_core::config::RagConfig;
use fusedb_core::hybrid::{HybridSystem, ResultSource};
use fusedb_core::tuner::{AutoTuner, TunerParams};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fusedb", about = "Hybrid memory + SQLite retrieval demo")]
struct Args {
    /// Configuration file (TOML). A missing file falls back to defaults.
    #[arg(short, long, default_value = "fusedb.toml")]
    config: PathBuf,

    /// Override the database path from the configuration.
    #[arg(long)]
    db_path: Option<String>,

    /// Number of query rounds to run.
    #[arg(long, default_value_t = 3)]
    rounds: usize,

    /// Results per query.
    #[arg(long, default_value_t = 3)]
    limit: usize,

    /// Queries to run; defaults to a built-in multilingual set.
    query: Vec<String>,
}

fn load_config(path: &Path) -> Result<RagConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                "config {} not found, using defaults",
                path.display()
            );
            Ok(RagConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("cannot read config {}", path.display())),
    }
}

fn demo_corpus() -> Vec<Chunk> {
    let zh_docs = [
        ("tech_1", "机器学习基础", "机器学习是人工智能的核心分支，通过算法让计算机从数据中学习模式和规律。"),
        ("tech_2", "深度学习原理", "深度学习使用多层神经网络模拟人脑处理信息的方式，在图像和语音识别方面表现卓越。"),
        ("tech_3", "自然语言处理", "自然语言处理让计算机理解和生成人类语言，包括文本分析、机器翻译等应用。"),
        ("tech_4", "推荐系统", "推荐系统通过分析用户行为和偏好，为用户提供个性化的内容和产品推荐。"),
        ("tech_5", "云计算", "云计算通过网络提供弹性的计算服务，实现资源的高效利用。"),
    ];
    let en_docs = [
        ("en_tech_1", "Machine Learning", "Machine learning algorithms enable computers to learn from data without explicit programming."),
        ("en_tech_2", "Deep Learning", "Deep learning networks with multiple layers can model complex patterns in large datasets."),
        ("en_tech_3", "Neural Networks", "Neural networks are computing systems inspired by biological neural networks."),
        ("en_tech_4", "Data Science", "Data science combines statistics, programming, and domain expertise to extract insights."),
        ("en_tech_5", "Cloud Computing", "Cloud computing provides on-demand access to computing resources over the internet."),
    ];

    let mut documents = Vec::new();
    for (doc_id, topic, text) in zh_docs {
        documents.push(Chunk {
            doc_id: doc_id.to_string(),
            seq_no: 0,
            topic: topic.to_string(),
            language: "zh".to_string(),
            text: text.to_string(),
            created_at: 0,
        });
    }
    for (doc_id, topic, text) in en_docs {
        documents.push(Chunk {
            doc_id: doc_id.to_string(),
            seq_no: 0,
            topic: topic.to_string(),
            language: "en".to_string(),
            text: text.to_string(),
            created_at: 0,
        });
    }
    // Cold business documents that rarely match the demo queries.
    for i in 1..=10 {
        documents.push(Chunk {
            doc_id: format!("business_{i}"),
            seq_no: 0,
            topic: format!("业务流程 {i}"),
            language: "zh".to_string(),
            text: format!("这是业务流程文档第{i}部分，描述了相关的操作规范和注意事项。"),
            created_at: 0,
        });
    }
    documents
}

fn default_queries() -> Vec<String> {
    [
        "机器学习算法",
        "深度学习网络",
        "自然语言处理",
        "machine learning",
        "neural networks",
        "cloud computing resources",
        "业务流程",
    ]
    .iter()
    .map(|q| q.to_string())
    .collect()
}

fn print_stats(system: &HybridSystem) {
    let stats = system.system_stats();
    println!("--- system stats ---");
    println!("  persistent chunks:   {}", stats.store.total_chunks);
    println!("  stored embeddings:   {}", stats.store.total_embeddings);
    println!("  database size:       {:.2} MB", stats.store.db_size_mb);
    println!("  memory-tier docs:    {}", stats.memory_docs);
    println!("  memory-tier chunks:  {}", stats.memory_chunks);
    println!("  bm25 vocabulary:     {}", stats.bm25_vocabulary);
    println!("  hot documents:       {}", stats.hot_docs);
    println!("  tracked documents:   {}", stats.tracked_docs);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("fusedb=info".parse()?)
                .add_directive("fusedb_core=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = load_config(&args.config)?;
    if let Some(db_path) = args.db_path {
        config.sqlite.db_path = db_path;
    }

    let system = Arc::new(HybridSystem::new(&config).context("invalid configuration")?);
    if !system.initialize() {
        bail!("failed to initialize the persistent store");
    }

    let mut tuner = AutoTuner::new(
        &config.tuner,
        TunerParams {
            ef: config.hnsw.ef_query,
            top_k: args.limit.max(1),
        },
    );
    if config.tuner.enable {
        let observed = Arc::clone(&system);
        tuner.start(
            Box::new(move || Some(observed.last_latency_ms())),
            // The demo has no relevance judgments, so recall is unobserved.
            Box::new(|| None),
        );
    }

    let corpus = demo_corpus();
    let loaded = system.load(&corpus);
    tracing::info!(loaded, total = corpus.len(), "corpus ingested");
    print_stats(&system);

    let queries = if args.query.is_empty() {
        default_queries()
    } else {
        args.query.clone()
    };

    for round in 1..=args.rounds {
        println!("\n=== round {round}/{} ===", args.rounds);
        for query in &queries {
            let results = system.search(query, args.limit);
            let memory_count = results
                .iter()
                .filter(|r| r.source == ResultSource::Memory)
                .count();
            println!(
                "  \"{query}\" -> {} results ({memory_count} memory, {} persistent, {:.2} ms)",
                results.len(),
                results.len() - memory_count,
                system.last_latency_ms()
            );
            if let Some(best) = results.first() {
                println!("      best: {} (score {:.4})", best.doc_id, best.score);
            }
        }
    }

    // A final explicit pass makes the round's promotions visible in the
    // closing stats without waiting on the background scheduler.
    system.promote_hot();
    println!();
    print_stats(&system);

    let params = tuner.params();
    println!("--- tuner ---");
    println!("  ef:    {}", params.ef);
    println!("  topK:  {}", params.top_k);
    tuner.stop();

    Ok(())
}
