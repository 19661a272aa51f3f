// Lazy Cartesian power of the template catalog.
//
// The number of progressions grows as `catalog_len ^ num_chords` and reaches
// millions for ordinary settings, so the product is never materialized.
// `Progressions` keeps one digit per chord position (an odometer in base
// `catalog_len`) and builds each progression on demand. Order matches the
// usual lexicographic product: the last position changes fastest.
//
// `total_combinations` gives the expected count without enumerating anything.

/// `catalog_len ^ num_chords`, or `None` if it does not fit in a `u64`.
pub fn total_combinations(catalog_len: usize, num_chords: u32) -> Option<u64> {
    u64::try_from(catalog_len).ok()?.checked_pow(num_chords)
}

/// Iterator over all length-`n` sequences drawn (with repetition) from `items`.
pub struct Progressions<'a, T> {
    items: &'a [T],
    digits: Vec<usize>,
    exhausted: bool,
}

impl<'a, T: Clone> Progressions<'a, T> {
    pub fn new(items: &'a [T], n: usize) -> Self {
        Progressions {
            items,
            digits: vec![0; n],
            // No items means no sequences, unless the length is zero, in
            // which case the single empty sequence still exists.
            exhausted: items.is_empty() && n > 0,
        }
    }

    /// Advance the odometer. Returns false once every digit has wrapped.
    fn increment(&mut self) -> bool {
        let base = self.items.len();
        for digit in self.digits.iter_mut().rev() {
            *digit += 1;
            if *digit < base {
                return true;
            }
            *digit = 0;
        }
        false
    }
}

impl<T: Clone> Iterator for Progressions<'_, T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Vec<T>> {
        if self.exhausted {
            return None;
        }
        let current = self
            .digits
            .iter()
            .map(|&d| self.items[d].clone())
            .collect();
        if !self.increment() {
            self.exhausted = true;
        }
        Some(current)
    }
}
