// src/common/i18n.rs

use anyhow::Context;
use std::collections::HashMap;

const DEFAULT_LANG: &str = "en";

// Catálogos embutidos no binário
const CATALOGS: [(&str, &str); 2] = [
    ("en", include_str!("../../locales/en.json")),
    ("pt", include_str!("../../locales/pt.json")),
];

/// Mensagens de erro por idioma, carregadas uma vez no AppState.
#[derive(Debug, Clone)]
pub struct I18nStore {
    catalogs: HashMap<String, HashMap<String, String>>,
}

impl I18nStore {
    pub fn new() -> anyhow::Result<Self> {
        let mut catalogs = HashMap::new();
        for (lang, raw) in CATALOGS {
            let messages: HashMap<String, String> = serde_json::from_str(raw)
                .with_context(|| format!("catálogo de mensagens '{lang}' inválido"))?;
            catalogs.insert(lang.to_string(), messages);
        }
        Ok(Self { catalogs })
    }

    /// Traduz `key` para `lang` (cai para inglês, e por fim para a própria chave).
    pub fn translate(&self, lang: &str, key: &str, args: &[(&str, String)]) -> String {
        let template = self
            .lookup(lang, key)
            .or_else(|| self.lookup(DEFAULT_LANG, key))
            .unwrap_or(key);

        args.iter().fold(template.to_string(), |msg, (name, value)| {
            msg.replace(&format!("{{{name}}}"), value)
        })
    }

    fn lookup(&self, lang: &str, key: &str) -> Option<&str> {
        self.catalogs
            .get(lang)
            .and_then(|messages| messages.get(key))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogs_have_the_same_keys() {
        let store = I18nStore::new().unwrap();
        let mut en: Vec<_> = store.catalogs["en"].keys().collect();
        let mut pt: Vec<_> = store.catalogs["pt"].keys().collect();
        en.sort();
        pt.sort();
        assert_eq!(en, pt);
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        let store = I18nStore::new().unwrap();
        assert_eq!(
            store.translate("de", "product_not_found", &[]),
            "Product not found."
        );
        assert_eq!(store.translate("en", "missing_key", &[]), "missing_key");
    }

    #[test]
    fn substitutes_placeholders() {
        let store = I18nStore::new().unwrap();
        let msg = store.translate("pt", "sku_already_exists", &[("code", "ELE-001".into())]);
        assert_eq!(msg, "O SKU 'ELE-001' já está em uso.");
    }
}
