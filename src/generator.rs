//! Seeded variant generation with queue-level dedup.
//!
//! Each draw picks one value per attribute, uniformly, in attribute-name
//! order. The canonical JSON of the draw is hashed; a hash already in the
//! queue is discarded. A duplicate still consumes its iteration, so a run
//! may append fewer rows than requested. The return value is the number of
//! rows actually appended.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::db::Db;
use crate::error::Result;
use crate::model::{AttributeOptions, NewQueueEntry, Variant};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Appends per transaction unless configured otherwise.
pub const DEFAULT_COMMIT_EVERY: u64 = 10;

/// Variant generator. Owns its random stream; two generators built from the
/// same seed produce the same draws.
pub struct VariantGenerator {
    rng: StdRng,
    commit_every: u64,
}

impl VariantGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            commit_every: DEFAULT_COMMIT_EVERY,
        }
    }

    /// Commit after every `k` draws, duplicates included, so one commit
    /// holds at most `k` appends. Zero is treated as one.
    pub fn with_commit_every(mut self, k: u64) -> Self {
        self.commit_every = k.max(1);
        self
    }

    /// Draw one variant. Does not touch storage.
    pub fn draw(&mut self, options: &AttributeOptions) -> Variant {
        let mut variant = Variant::new();
        for (name, values) in options.iter() {
            let idx = self.rng.gen_range(0..values.len());
            variant.set(name, values[idx].clone());
        }
        variant
    }

    /// Draw `requested` variants and append the new ones to the queue.
    pub async fn generate(
        &mut self,
        db: &Db,
        options: &AttributeOptions,
        requested: u64,
    ) -> Result<u64> {
        info!(requested, attributes = options.len(), "generating variants");

        let mut tx = db.begin_append().await?;
        let mut appended = 0u64;
        let mut duplicates = 0u64;

        for i in 0..requested {
            let variant = self.draw(options);
            let entry = NewQueueEntry::from_variant(&variant)?;

            if tx.append(&entry).await? {
                appended += 1;
            } else {
                duplicates += 1;
                debug!(hash = %entry.hash, "duplicate variant skipped");
            }

            if (i + 1) % self.commit_every == 0 {
                tx.commit().await?;
                tx = db.begin_append().await?;
            }
        }

        tx.commit().await?;

        metrics::variants_generated().add(appended, &[KeyValue::new("result", "appended")]);
        metrics::variants_generated().add(duplicates, &[KeyValue::new("result", "duplicate")]);
        info!(requested, appended, duplicates, "finished generating variants");

        Ok(appended)
    }

    /// Generate from several schemas in turn against one queue. The random
    /// stream carries over from one schema to the next.
    pub async fn generate_many(
        &mut self,
        db: &Db,
        schemas: &[AttributeOptions],
        requested_per_schema: u64,
    ) -> Result<u64> {
        let mut total = 0;
        for (index, options) in schemas.iter().enumerate() {
            debug!(schema = index, "processing schema");
            total += self.generate(db, options, requested_per_schema).await?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OptionValue;

    fn options() -> AttributeOptions {
        let mut options = AttributeOptions::new();
        options.insert("Color", vec!["Red".into(), "Blue".into(), "Green".into()]);
        options.insert("Glass", vec![OptionValue::Bool(true), OptionValue::Bool(false)]);
        options.insert("Legs", vec![OptionValue::from(3i64), OptionValue::from(4i64)]);
        options
    }

    #[test]
    fn draw_covers_every_attribute_with_allowed_values() {
        let options = options();
        let mut generator = VariantGenerator::new(7);

        for _ in 0..50 {
            let variant = generator.draw(&options);
            assert_eq!(variant.len(), options.len());
            for (name, values) in options.iter() {
                assert!(values.contains(variant.get(name).unwrap()));
            }
        }
    }

    #[test]
    fn same_seed_same_draws() {
        let options = options();
        let mut a = VariantGenerator::new(99);
        let mut b = VariantGenerator::new(99);

        let left: Vec<Variant> = (0..100).map(|_| a.draw(&options)).collect();
        let right: Vec<Variant> = (0..100).map(|_| b.draw(&options)).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn different_seeds_diverge() {
        let options = options();
        let mut a = VariantGenerator::new(1);
        let mut b = VariantGenerator::new(2);

        let left: Vec<Variant> = (0..100).map(|_| a.draw(&options)).collect();
        let right: Vec<Variant> = (0..100).map(|_| b.draw(&options)).collect();
        assert_ne!(left, right);
    }

    #[test]
    fn empty_options_draw_empty_variant() {
        let mut generator = VariantGenerator::new(0);
        assert!(generator.draw(&AttributeOptions::new()).is_empty());
    }

    #[test]
    fn commit_every_zero_is_clamped() {
        let generator = VariantGenerator::new(0).with_commit_every(0);
        assert_eq!(generator.commit_every, 1);
    }
}
