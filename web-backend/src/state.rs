use scanrelay_core::{
    AnalyzerRegistry, MythrilAnalyzer, OyenteAnalyzer, ScanConfig, ScanOrchestrator, ScratchStore,
};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub registry: AnalyzerRegistry,
    pub orchestrator: ScanOrchestrator,
    pub store: ScratchStore,
    pub default_max_depth: u32,
    pub max_depth_limit: u32,
}

impl AppState {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        // 注册分析器
        let mut registry = AnalyzerRegistry::new();
        let (program, args) = split_program(&config.mythril_command, "myth");
        registry.register_analyzer(MythrilAnalyzer::with_command(program, args));
        let (program, args) = split_program(&config.oyente_command, "oyente");
        registry.register_analyzer(OyenteAnalyzer::with_command(program, args));
        registry
            .set_default(&config.analyzer)
            .map_err(|e| anyhow::anyhow!("ANALYZER: {}", e))?;

        // 初始化临时存储目录
        let store = ScratchStore::new(&config.scratch_dir, config.max_upload_bytes).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create scratch directory {}: {}",
                config.scratch_dir.display(),
                e
            )
        })?;

        let orchestrator = ScanOrchestrator::new(ScanConfig {
            timeout: config.scan_timeout,
            max_output_bytes: config.max_output_bytes,
        });

        tracing::info!(
            "Scratch directory: {}, scan timeout: {:?}",
            store.dir().display(),
            config.scan_timeout
        );

        Ok(Self {
            registry,
            orchestrator,
            store,
            default_max_depth: config.default_max_depth,
            max_depth_limit: config.max_depth_limit,
        })
    }
}

fn split_program<'a>(command: &'a [String], fallback: &'a str) -> (&'a str, &'a [String]) {
    match command.split_first() {
        Some((program, args)) => (program.as_str(), args),
        None => (fallback, &[]),
    }
}
