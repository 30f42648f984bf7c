//! Engine Context - 引擎目录

use super::{EngineConfigError, EngineDefinition};

/// 已校验的引擎集合，保持配置顺序
#[derive(Debug, Clone, Default)]
pub struct EngineCatalog {
    engines: Vec<EngineDefinition>,
}

impl EngineCatalog {
    /// 校验每个定义并检查名称唯一
    pub fn new(engines: Vec<EngineDefinition>) -> Result<Self, EngineConfigError> {
        for (i, engine) in engines.iter().enumerate() {
            engine.validate()?;
            if engines[..i].iter().any(|e| e.name == engine.name) {
                return Err(EngineConfigError::Duplicate(engine.name.clone()));
            }
        }
        Ok(Self { engines })
    }

    pub fn get(&self, name: &str) -> Option<&EngineDefinition> {
        self.engines.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineDefinition> {
        self.engines.iter()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine::{EngineMode, OutputKind};

    fn json_engine(name: &str) -> EngineDefinition {
        let mut def = EngineDefinition::new(name, EngineMode::CustomCommand);
        def.command = Some("echo hello".into());
        def.output = OutputKind::Json;
        def
    }

    #[test]
    fn test_lookup_by_name() {
        let catalog = EngineCatalog::new(vec![json_engine("a"), json_engine("b")]).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("b").is_some());
        assert!(catalog.get("c").is_none());
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = EngineCatalog::new(vec![json_engine("a"), json_engine("a")]).unwrap_err();
        assert!(matches!(err, EngineConfigError::Duplicate(name) if name == "a"));
    }
}
