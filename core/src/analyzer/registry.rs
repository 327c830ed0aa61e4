use super::Analyzer;
use crate::error::{Result, ScanError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 已注册的分析器，按名称选择；部署时指定默认分析器
#[derive(Clone)]
pub struct AnalyzerRegistry {
    analyzers: BTreeMap<String, Arc<dyn Analyzer>>,
    default_name: Option<String>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self {
            analyzers: BTreeMap::new(),
            default_name: None,
        }
    }

    /// 第一个注册的分析器成为默认值
    pub fn register_analyzer<A: Analyzer + 'static>(&mut self, analyzer: A) {
        let name = analyzer.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.analyzers.insert(name, Arc::new(analyzer));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.analyzers.contains_key(name) {
            return Err(ScanError::InvalidInput(format!("unknown analyzer: {}", name)));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// 按名称查找；`None` 表示使用默认分析器
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn Analyzer>> {
        let name = match name.or(self.default_name.as_deref()) {
            Some(name) => name,
            None => return Err(ScanError::InvalidInput("no analyzer registered".to_string())),
        };
        self.analyzers
            .get(name)
            .cloned()
            .ok_or_else(|| ScanError::InvalidInput(format!("unknown analyzer: {}", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.analyzers.keys().map(String::as_str).collect()
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
