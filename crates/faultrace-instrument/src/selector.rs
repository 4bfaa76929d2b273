//! Selector capability, registry, and the shared classification log.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use faultrace_core::{Error, Result};
use faultrace_ir::{InstIndex, Instruction, Module};

use crate::selectors::MemCopyOverflowSelector;

/// Shared record of which fault categories the selectors chose.
///
/// Downstream tooling reads one category name from a file to know which
/// fault model drives the injection run; selectors record their decision
/// here and the host flushes it at the process boundary. Recording is
/// idempotent: repeated classification of targets by the same selector
/// rewrites the same slot.
#[derive(Debug, Clone, Default)]
pub struct ClassificationLog {
    categories: BTreeMap<String, String>,
    last: Option<String>,
}

impl ClassificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, selector: &str, category: &str) {
        self.categories
            .insert(selector.to_string(), category.to_string());
        self.last = Some(category.to_string());
    }

    pub fn category_for(&self, selector: &str) -> Option<&str> {
        self.categories.get(selector).map(String::as_str)
    }

    /// Most recently recorded category (last writer wins)
    pub fn last_category(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Overwrite `path` with a single line naming the most recent
    /// category. Single-slot semantics: the file never accumulates.
    /// A log with no decisions leaves the file untouched.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let Some(category) = &self.last else {
            return Ok(());
        };
        debug!(category = %category, path = %path.display(), "writing classification");
        fs::write(path, format!("{category}\n"))?;
        Ok(())
    }
}

/// The sole capability a selector must implement: decide whether an
/// instruction is a fault-injection/trace target. A true decision records
/// the selector's fault category to the shared log.
pub trait Selector: Send + Sync {
    fn classify(&self, module: &Module, inst: &Instruction, log: &mut ClassificationLog) -> bool;
}

/// Name-keyed table of selectors, built explicitly by the host rather
/// than through static initialization.
pub struct SelectorRegistry {
    selectors: BTreeMap<String, Box<dyn Selector>>,
}

impl SelectorRegistry {
    pub fn new() -> Self {
        Self {
            selectors: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with the built-in selectors
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // the built-in set is collision-free
        registry.selectors.insert(
            MemCopyOverflowSelector::NAME.to_string(),
            Box::new(MemCopyOverflowSelector),
        );
        registry
    }

    /// Add a selector under a unique pass name. A duplicate name is a
    /// fatal configuration error and leaves the existing entry in place.
    pub fn register(&mut self, name: &str, selector: Box<dyn Selector>) -> Result<()> {
        if self.selectors.contains_key(name) {
            return Err(Error::DuplicateSelector(name.to_string()));
        }
        self.selectors.insert(name.to_string(), selector);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Selector> {
        self.selectors.get(name).map(|s| s.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.selectors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

impl Default for SelectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `selector` over every instruction in `module`, assigning a stable
/// index to each classified target. Returns the number of targets found.
pub fn select_targets(
    selector: &dyn Selector,
    module: &Module,
    index: &mut InstIndex,
    log: &mut ClassificationLog,
) -> usize {
    let mut targets = 0;
    for func in &module.functions {
        for (_, _, inst) in func.iter_instructions() {
            if selector.classify(module, inst, log) {
                index.assign(inst.id);
                targets += 1;
            }
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultrace_ir::{Callee, Function, InstId, Opcode, Operand, Register, Ty};

    struct Always(bool, &'static str);

    impl Selector for Always {
        fn classify(
            &self,
            _module: &Module,
            _inst: &Instruction,
            log: &mut ClassificationLog,
        ) -> bool {
            if self.0 {
                log.record(self.1, self.1);
            }
            self.0
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = SelectorRegistry::new();
        registry.register("a", Box::new(Always(true, "a"))).unwrap();

        let err = registry
            .register("a", Box::new(Always(false, "b")))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSelector(_)));

        // the first registration survives the collision
        let mut module = Module::new("m");
        let func = Function::new("f".to_string(), Vec::new(), Ty::Void);
        module.add_function(func);
        let inst = Instruction::ret(InstId(0), None);
        let mut log = ClassificationLog::new();
        assert!(registry.get("a").unwrap().classify(&module, &inst, &mut log));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_with_builtins() {
        let registry = SelectorRegistry::with_builtins();
        assert!(registry.get(MemCopyOverflowSelector::NAME).is_some());
        assert!(registry.get("no-such-selector").is_none());
    }

    #[test]
    fn test_classification_log_last_writer_wins() {
        let mut log = ClassificationLog::new();
        assert!(log.is_empty());
        assert_eq!(log.last_category(), None);

        log.record("sel-a", "cat-a");
        log.record("sel-b", "cat-b");
        log.record("sel-a", "cat-a");

        assert_eq!(log.category_for("sel-a"), Some("cat-a"));
        assert_eq!(log.category_for("sel-b"), Some("cat-b"));
        assert_eq!(log.last_category(), Some("cat-a"));
    }

    #[test]
    fn test_classification_log_single_slot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Automation-config");

        let mut log = ClassificationLog::new();
        log.write_to(&path).unwrap();
        assert!(!path.exists());

        log.record("sel-a", "cat-a");
        log.write_to(&path).unwrap();
        log.record("sel-b", "cat-b");
        log.write_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "cat-b\n");
    }

    #[test]
    fn test_select_targets_assigns_indices() {
        let mut module = Module::new("m");
        let mut func = Function::new("f".to_string(), Vec::new(), Ty::Void);
        let block = func.get_block_mut(0).unwrap();
        block.push(Instruction::call(
            InstId(0),
            Callee::Direct("memcpy".to_string()),
            Ty::Ptr,
            vec![Operand::Register(Register(0))],
        ));
        block.push(Instruction::arith(
            InstId(1),
            Opcode::Add,
            Ty::Int(32),
            Register(1),
            Register(2),
            Register(3),
        ));
        block.push(Instruction::ret(InstId(2), None));
        module.add_function(func);

        let mut index = InstIndex::new();
        let mut log = ClassificationLog::new();
        let targets = select_targets(&MemCopyOverflowSelector, &module, &mut index, &mut log);

        assert_eq!(targets, 1);
        assert!(index.is_indexed(InstId(0)));
        assert!(!index.is_indexed(InstId(1)));
        assert_eq!(log.last_category(), Some(MemCopyOverflowSelector::CATEGORY));
    }
}
