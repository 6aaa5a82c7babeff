/// Split `items` into contiguous chunks for `workers` concurrent workers.
///
/// With fewer items than workers the whole input is returned as one chunk.
/// Otherwise exactly `workers` chunks of `len / workers` items are produced,
/// the last one absorbing the remainder.
pub fn chunks<T>(items: &[T], workers: usize) -> Vec<&[T]> {
    let workers = workers.max(1);
    if items.len() < workers {
        return vec![items];
    }
    let size = items.len() / workers;
    let mut out = Vec::with_capacity(workers);
    for i in 0..workers - 1 {
        out.push(&items[i * size..(i + 1) * size]);
    }
    out.push(&items[(workers - 1) * size..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_items_than_workers_is_one_chunk() {
        let v = vec![1, 2, 3];
        let c = chunks(&v, 32);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0], &[1, 2, 3][..]);
    }

    #[test]
    fn empty_input_is_one_empty_chunk() {
        let v: Vec<u8> = Vec::new();
        let c = chunks(&v, 4);
        assert_eq!(c.len(), 1);
        assert!(c[0].is_empty());
    }

    #[test]
    fn last_chunk_absorbs_remainder() {
        let v: Vec<u32> = (0..70).collect();
        let c = chunks(&v, 32);
        assert_eq!(c.len(), 32);
        assert!(c[..31].iter().all(|ch| ch.len() == 2));
        assert_eq!(c[31].len(), 70 - 31 * 2);
        assert_eq!(c.concat(), v);
    }

    #[test]
    fn concatenation_matches_input_for_all_sizes() {
        for workers in 1..=9usize {
            for len in workers..=40usize {
                let v: Vec<usize> = (0..len).collect();
                let c = chunks(&v, workers);
                assert_eq!(c.len(), workers, "len={} workers={}", len, workers);
                assert!(c.iter().all(|ch| !ch.is_empty()));
                assert!(c[..workers - 1].iter().all(|ch| ch.len() == len / workers));
                assert_eq!(c.concat(), v);
            }
        }
    }

    #[test]
    fn zero_workers_treated_as_one() {
        let v = vec!["a", "b"];
        assert_eq!(chunks(&v, 0), vec![&v[..]]);
    }
}
