use std::collections::HashMap;
use std::sync::Arc;

use crate::template::Template;
use crate::TemplateError;

/// Parse-once memo keyed by template string. A reactive host re-renders on
/// every provider tick; the tree only changes when the user edits config, so
/// lexing and parsing are skipped for known templates. Parse failures are not
/// cached: the host surfaces the error and the user is about to edit the
/// template anyway.
#[derive(Debug, Default)]
pub struct TemplateCache {
    templates: HashMap<String, Arc<Template>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_parse(&mut self, source: &str) -> Result<Arc<Template>, TemplateError> {
        if let Some(template) = self.templates.get(source) {
            return Ok(Arc::clone(template));
        }
        let template = Arc::new(Template::parse(source)?);
        self.templates
            .insert(source.to_string(), Arc::clone(&template));
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn clear(&mut self) {
        self.templates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lookup_returns_the_cached_tree() {
        let mut cache = TemplateCache::new();
        let first = cache.get_or_parse("{{ cpu.usage }}").expect("parse");
        let second = cache.get_or_parse("{{ cpu.usage }}").expect("parse");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn parse_failures_are_not_cached() {
        let mut cache = TemplateCache::new();
        assert!(cache.get_or_parse("{{ broken").is_err());
        assert!(cache.is_empty());
    }
}
