// src/services/codes.rs

use chrono::{DateTime, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashSet;

use crate::models::category::ProductCategory;

/// Tentativas antes de cair no código por timestamp.
pub const MAX_CODE_ATTEMPTS: usize = 10;

/// Prefixo usado quando o produto do lote não pôde ser consultado.
pub const FALLBACK_BATCH_PREFIX: &str = "BTH";

// ---
// SKU: {CAT}-{seq:03}
// ---

pub fn format_sku(prefix: &str, seq: i64) -> String {
    format!("{prefix}-{seq:03}")
}

/// Candidatos a SKU a partir de `count + 1` (count = produtos do tenant na categoria).
pub fn sku_candidates(category: ProductCategory, count: i64) -> Vec<String> {
    let prefix = category.sku_prefix();
    (1..=MAX_CODE_ATTEMPTS as i64)
        .map(|offset| format_sku(&prefix, count + offset))
        .collect()
}

/// Primeiro candidato que ainda não existe.
pub fn pick_available(candidates: Vec<String>, taken: &HashSet<String>) -> Option<String> {
    candidates.into_iter().find(|c| !taken.contains(c))
}

/// Último recurso quando todas as tentativas colidiram.
pub fn fallback_code(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}-{}", now.timestamp_millis())
}

// ---
// Código de lote: {PREFIX}-{AAMMDD}-{RAND4}-B{seq:03}
// ---

/// Segmento inicial do SKU do produto (letras antes do primeiro `-`).
pub fn batch_prefix(product_sku: Option<&str>) -> String {
    product_sku
        .and_then(|sku| sku.split('-').next())
        .map(|segment| {
            segment
                .chars()
                .filter(|c| c.is_ascii_alphabetic())
                .collect::<String>()
                .to_ascii_uppercase()
        })
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or_else(|| FALLBACK_BATCH_PREFIX.to_string())
}

pub fn format_batch_code(prefix: &str, date: NaiveDate, suffix: &str, seq: i64) -> String {
    format!("{prefix}-{}-{suffix}-B{seq:03}", date.format("%y%m%d"))
}

pub fn random_suffix<R: Rng>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(4)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

/// Candidatos a código de lote; `batch_count` = lotes já existentes do produto.
pub fn batch_code_candidates<R: Rng>(
    rng: &mut R,
    prefix: &str,
    date: NaiveDate,
    batch_count: i64,
) -> Vec<String> {
    (0..MAX_CODE_ATTEMPTS as i64)
        .map(|attempt| format_batch_code(prefix, date, &random_suffix(rng), batch_count + 1 + attempt))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn sku_sequence_skips_taken_codes() {
        let candidates = sku_candidates(ProductCategory::Electronics, 0);
        assert_eq!(candidates[0], "ELE-001");
        assert_eq!(candidates.len(), MAX_CODE_ATTEMPTS);

        let taken: HashSet<String> = ["ELE-001".to_string()].into();
        assert_eq!(pick_available(candidates, &taken).as_deref(), Some("ELE-002"));
    }

    #[test]
    fn exhausted_candidates_fall_back_to_timestamp() {
        let candidates = sku_candidates(ProductCategory::Books, 4);
        let taken: HashSet<String> = candidates.iter().cloned().collect();
        assert_eq!(pick_available(candidates, &taken), None);

        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(fallback_code("BOO", now), format!("BOO-{}", now.timestamp_millis()));
    }

    #[test]
    fn batch_prefix_uses_leading_sku_segment() {
        assert_eq!(batch_prefix(Some("ele-001")), "ELE");
        assert_eq!(batch_prefix(Some("")), FALLBACK_BATCH_PREFIX);
        assert_eq!(batch_prefix(None), FALLBACK_BATCH_PREFIX);
    }

    #[test]
    fn batch_code_format() {
        let mut rng = StdRng::seed_from_u64(7);
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let codes = batch_code_candidates(&mut rng, "CLO", date, 2);

        let first = &codes[0];
        let parts: Vec<&str> = first.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "CLO");
        assert_eq!(parts[1], "250309");
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(parts[3], "B003");
        assert!(codes[9].ends_with("-B012"));
    }
}
