//! Lazy, order-preserving partitioning into fixed-size batches.

/// Iterator adapter yielding consecutive `Vec`s of at most `size` items.
///
/// Every batch except possibly the last holds exactly `size` items. A size of
/// zero yields nothing.
#[derive(Debug, Clone)]
pub struct Batches<I> {
    iter: I,
    size: usize,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.size == 0 {
            return None;
        }
        let batch: Vec<I::Item> = self.iter.by_ref().take(self.size).collect();
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

pub fn batches<I: IntoIterator>(items: I, size: usize) -> Batches<I::IntoIter> {
    Batches {
        iter: items.into_iter(),
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_five_into_twos() {
        let sizes: Vec<usize> = batches(1..=5, 2).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_exact_multiple() {
        let out: Vec<Vec<u32>> = batches(vec![1, 2, 3, 4], 2).collect();
        assert_eq!(out, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_empty_and_zero() {
        assert_eq!(batches(Vec::<u32>::new(), 3).count(), 0);
        assert_eq!(batches(vec![1, 2], 0).count(), 0);
    }

    #[test]
    fn test_is_lazy() {
        // An unbounded source must still produce batches on demand
        let first: Vec<Vec<u64>> = batches(0u64.., 3).take(2).collect();
        assert_eq!(first, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    proptest! {
        #[test]
        fn prop_partition_preserves_order_and_sizes(
            items in proptest::collection::vec(any::<u16>(), 1..200),
            size in 2usize..50,
        ) {
            let parts: Vec<Vec<u16>> = batches(items.clone(), size).collect();

            let (last, full) = parts.split_last().unwrap();
            for part in full {
                prop_assert_eq!(part.len(), size);
            }
            prop_assert!(!last.is_empty() && last.len() <= size);

            let flattened: Vec<u16> = parts.into_iter().flatten().collect();
            prop_assert_eq!(flattened, items);
        }
    }
}
