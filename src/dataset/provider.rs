//! Batch provider
//!
//! Iterates a dataset in fixed-size batches. Each call to [`BatchProvider::iter`] is
//! one full pass; with shuffling enabled every pass draws a fresh permutation from a
//! seeded RNG carried across passes, so the sequence of permutations is reproducible.
//!
//! Decoding happens on a dedicated rayon pool of `num_workers` threads, fed by one
//! producer thread that stays at most `prefetch` batches ahead of the consumer.
//! Batches come out in order, and the first decode failure ends the pass with an error.
//! With `num_workers == 0` batches are decoded on the calling thread.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use super::burn_dataset::{CaltechBatch, CaltechBatcher, CaltechBurnDataset, CaltechItem};
use crate::utils::error::{CaltechError, Result};

/// Batching policy
#[derive(Debug, Clone)]
pub struct BatchProviderConfig {
    pub batch_size: usize,
    /// Draw a new permutation at the start of every pass
    pub shuffle: bool,
    /// Decode threads; 0 decodes inline
    pub num_workers: usize,
    /// Omit a trailing batch smaller than `batch_size`
    pub drop_last: bool,
    /// Seed for the shuffle RNG
    pub seed: u64,
    /// Batches decoded ahead of the consumer
    pub prefetch: usize,
}

impl BatchProviderConfig {
    /// Shuffled, drop-last policy used for training
    pub fn train(batch_size: usize, num_workers: usize, seed: u64) -> Self {
        Self {
            batch_size,
            shuffle: true,
            num_workers,
            drop_last: true,
            seed,
            prefetch: 2,
        }
    }

    /// Sequential policy keeping every sample, used for validation and test
    pub fn eval(batch_size: usize, num_workers: usize) -> Self {
        Self {
            batch_size,
            shuffle: false,
            num_workers,
            drop_last: false,
            seed: 0,
            prefetch: 2,
        }
    }
}

/// Restartable batch source over a [`CaltechBurnDataset`]
pub struct BatchProvider {
    dataset: Arc<CaltechBurnDataset>,
    config: BatchProviderConfig,
    pool: Option<Arc<ThreadPool>>,
    rng: Mutex<ChaCha8Rng>,
    batcher: CaltechBatcher,
}

impl BatchProvider {
    pub fn new(dataset: CaltechBurnDataset, config: BatchProviderConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(CaltechError::Config("batch size must be positive".to_string()));
        }

        let pool = if config.num_workers > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.num_workers)
                .thread_name(|i| format!("decode-{}", i))
                .build()
                .map_err(|e| CaltechError::Config(format!("cannot start decode pool: {}", e)))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        let batcher = CaltechBatcher::new(dataset.transform().crop_size as usize);
        let rng = Mutex::new(ChaCha8Rng::seed_from_u64(config.seed));

        Ok(Self {
            dataset: Arc::new(dataset),
            config,
            pool,
            rng,
            batcher,
        })
    }

    /// Number of samples in the underlying dataset
    pub fn num_items(&self) -> usize {
        self.dataset.samples().len()
    }

    /// Number of batches one pass yields
    pub fn len(&self) -> usize {
        let n = self.num_items();
        if self.config.drop_last {
            n / self.config.batch_size
        } else {
            n.div_ceil(self.config.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index order for the next pass
    fn pass_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.num_items()).collect();
        if self.config.shuffle {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            order.shuffle(&mut *rng);
        }
        order
    }

    fn pass_chunks(&self) -> Vec<Vec<usize>> {
        let batch_size = self.config.batch_size;
        self.pass_order()
            .chunks(batch_size)
            .filter(|chunk| !self.config.drop_last || chunk.len() == batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// Start a pass yielding decoded item batches
    pub fn iter(&self) -> ItemBatchIter {
        let chunks = self.pass_chunks();
        debug!("Starting pass with {} batches", chunks.len());

        match &self.pool {
            None => ItemBatchIter::Inline {
                dataset: Arc::clone(&self.dataset),
                chunks: chunks.into_iter(),
                failed: false,
            },
            Some(pool) => {
                let (tx, rx) = mpsc::sync_channel(self.config.prefetch.max(1));
                let dataset = Arc::clone(&self.dataset);
                let pool = Arc::clone(pool);

                let handle = std::thread::spawn(move || {
                    for chunk in chunks {
                        let batch = pool.install(|| {
                            chunk
                                .par_iter()
                                .map(|&i| dataset.get_item(i))
                                .collect::<Result<Vec<_>>>()
                        });
                        let failed = batch.is_err();
                        // A closed channel means the consumer stopped early
                        if tx.send(batch).is_err() || failed {
                            break;
                        }
                    }
                });

                ItemBatchIter::Prefetch {
                    rx: Some(rx),
                    handle: Some(handle),
                }
            }
        }
    }

    /// Start a pass yielding tensor batches on `device`
    pub fn batches<'a, B: Backend>(
        &'a self,
        device: &'a B::Device,
    ) -> impl Iterator<Item = Result<CaltechBatch<B>>> + 'a {
        self.iter().map(move |items| {
            items.map(|items| {
                Batcher::<B, CaltechItem, CaltechBatch<B>>::batch(&self.batcher, items, device)
            })
        })
    }
}

/// One pass over a [`BatchProvider`]
pub enum ItemBatchIter {
    Inline {
        dataset: Arc<CaltechBurnDataset>,
        chunks: std::vec::IntoIter<Vec<usize>>,
        failed: bool,
    },
    Prefetch {
        rx: Option<Receiver<Result<Vec<CaltechItem>>>>,
        handle: Option<JoinHandle<()>>,
    },
}

impl Iterator for ItemBatchIter {
    type Item = Result<Vec<CaltechItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ItemBatchIter::Inline {
                dataset,
                chunks,
                failed,
            } => {
                if *failed {
                    return None;
                }
                let chunk = chunks.next()?;
                let batch = chunk
                    .iter()
                    .map(|&i| dataset.get_item(i))
                    .collect::<Result<Vec<_>>>();
                *failed = batch.is_err();
                Some(batch)
            }
            ItemBatchIter::Prefetch { rx, handle } => {
                let received = rx.as_ref()?.recv();
                if let Ok(batch) = received {
                    return Some(batch);
                }

                // Disconnected: the producer either finished the pass or died
                drop(rx.take());
                match handle.take().map(JoinHandle::join) {
                    Some(Err(panic)) => Some(Err(CaltechError::Worker(format!(
                        "batch producer panicked: {}",
                        panic_message(panic.as_ref())
                    )))),
                    _ => None,
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Drop for ItemBatchIter {
    fn drop(&mut self) {
        if let ItemBatchIter::Prefetch { rx, handle } = self {
            // Close the channel first so a blocked producer wakes up
            drop(rx.take());
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Normalization, Sample, Transform};
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    type TestBackend = NdArray<f32>;

    fn write_images(n: usize) -> (TempDir, Vec<Sample>) {
        let dir = tempdir().unwrap();
        let samples = (0..n)
            .map(|i| {
                let path = dir.path().join(format!("img_{}.png", i));
                RgbImage::from_pixel(6, 6, Rgb([i as u8, 0, 0])).save(&path).unwrap();
                Sample { path, label: i % 3 }
            })
            .collect();
        (dir, samples)
    }

    fn dataset(samples: Vec<Sample>) -> CaltechBurnDataset {
        CaltechBurnDataset::new(samples, Transform::new(4, 4, Normalization::Centered).unwrap())
    }

    fn paths(provider: &BatchProvider) -> Vec<Vec<String>> {
        provider
            .iter()
            .map(|b| b.unwrap().into_iter().map(|item| item.path).collect())
            .collect()
    }

    #[test]
    fn test_drop_last_batch_count() {
        let (_dir, samples) = write_images(10);
        let mut config = BatchProviderConfig::train(4, 0, 1);
        let provider = BatchProvider::new(dataset(samples.clone()), config.clone()).unwrap();
        assert_eq!(provider.len(), 2);
        assert!(provider.iter().all(|b| b.unwrap().len() == 4));

        config.drop_last = false;
        let provider = BatchProvider::new(dataset(samples), config).unwrap();
        let sizes: Vec<usize> = provider.iter().map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_sequential_order_with_workers() {
        let (_dir, samples) = write_images(7);
        let expected: Vec<String> = samples
            .iter()
            .map(|s| s.path.to_string_lossy().to_string())
            .collect();
        let provider = BatchProvider::new(dataset(samples), BatchProviderConfig::eval(3, 2)).unwrap();

        let flat: Vec<String> = paths(&provider).into_iter().flatten().collect();
        assert_eq!(flat, expected);
    }

    #[test]
    fn test_shuffle_changes_between_passes_and_is_seeded() {
        let (_dir, samples) = write_images(12);
        let config = BatchProviderConfig::train(12, 2, 9);
        let a = BatchProvider::new(dataset(samples.clone()), config.clone()).unwrap();
        let b = BatchProvider::new(dataset(samples), config).unwrap();

        let a1 = paths(&a);
        let a2 = paths(&a);
        assert_ne!(a1, a2);
        assert_eq!(a1, paths(&b));
        assert_eq!(a2, paths(&b));

        let mut sorted = a1[0].clone();
        sorted.sort();
        let mut sorted2 = a2[0].clone();
        sorted2.sort();
        assert_eq!(sorted, sorted2);
    }

    #[test]
    fn test_decode_failure_ends_pass() {
        let (_dir, mut samples) = write_images(4);
        samples[2].path = PathBuf::from("/missing/image.jpg");

        for workers in [0, 2] {
            let provider =
                BatchProvider::new(dataset(samples.clone()), BatchProviderConfig::eval(1, workers))
                    .unwrap();
            let results: Vec<_> = provider.iter().collect();
            assert_eq!(results.len(), 3);
            assert!(results[2].as_ref().unwrap_err().is_io());
        }
    }

    #[test]
    fn test_producer_panic_fails_pass() {
        let (tx, rx) = mpsc::sync_channel(2);
        let handle = std::thread::spawn(move || {
            let _ = tx.send(Ok(Vec::new()));
            panic!("decoder crashed");
        });
        let iter = ItemBatchIter::Prefetch {
            rx: Some(rx),
            handle: Some(handle),
        };

        let results: Vec<_> = iter.collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(CaltechError::Worker(msg)) => assert!(msg.contains("decoder crashed")),
            other => panic!("expected worker error, got {:?}", other.as_ref().map(Vec::len)),
        }
    }

    #[test]
    fn test_early_drop_does_not_hang() {
        let (_dir, samples) = write_images(20);
        let provider = BatchProvider::new(dataset(samples), BatchProviderConfig::eval(1, 2)).unwrap();
        let mut iter = provider.iter();
        assert!(iter.next().is_some());
        drop(iter);
    }

    #[test]
    fn test_tensor_batches() {
        let (_dir, samples) = write_images(5);
        let provider = BatchProvider::new(dataset(samples), BatchProviderConfig::eval(2, 0)).unwrap();
        let device = Default::default();
        let dims: Vec<[usize; 4]> = provider
            .batches::<TestBackend>(&device)
            .map(|b| b.unwrap().images.dims())
            .collect();
        assert_eq!(dims, vec![[2, 3, 4, 4], [2, 3, 4, 4], [1, 3, 4, 4]]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let (_dir, samples) = write_images(1);
        let mut config = BatchProviderConfig::eval(1, 0);
        config.batch_size = 0;
        assert!(BatchProvider::new(dataset(samples), config).is_err());
    }
}
