use crate::error::ShuffleError;
use crate::shuffler::Shuffler;

/// A fixed-capacity, single-destination shuffle buffer. Messages are
/// written in arrival order, then read back out in a permuted order after
/// `shuffle()`. With dummy padding enabled, indices past the number of
/// messages actually written read back as all-zero elements so an observer
/// cannot distinguish real traffic volume from the buffer's capacity.
pub struct ShuffleBuffer {
    data: Vec<Option<Vec<u8>>>,
    element_length: usize,
    capacity: usize,
    element_count: usize,
    num_elements: usize,
    permutation: Option<Vec<usize>>,
    position: usize,
    pending: Vec<u8>,
    pending_offset: usize,
}

impl ShuffleBuffer {
    pub fn new(element_length: usize, capacity: usize) -> Self {
        Self {
            data: (0..capacity).map(|_| None).collect(),
            element_length,
            capacity,
            element_count: 0,
            num_elements: capacity,
            permutation: None,
            position: 0,
            pending: vec![0u8; element_length],
            pending_offset: element_length,
        }
    }

    pub fn num_messages(&self) -> usize {
        self.element_count
    }

    /// Total byte length of the buffer once shuffled: `num_elements *
    /// element_length`.
    pub fn len_bytes(&self) -> usize {
        self.num_elements * self.element_length
    }

    pub fn write(&mut self, element: &[u8]) -> Result<(), ShuffleError> {
        if self.element_count >= self.capacity {
            return Err(ShuffleError::LinkOverflow(self.capacity));
        }
        self.data[self.element_count] = Some(element.to_vec());
        self.element_count += 1;
        Ok(())
    }

    /// Fix the read order. With `with_dummies = false`, the buffer shrinks
    /// to exactly the messages written (no padding) — used for rounds that
    /// don't need to hide the true message count, e.g. checkpoint requests.
    pub fn shuffle(&mut self, shuffler: &Shuffler, with_dummies: bool) {
        self.num_elements = if with_dummies {
            self.capacity
        } else {
            self.element_count
        };
        self.permutation = Some(shuffler.perm(self.num_elements));
        self.position = 0;
        self.pending_offset = self.element_length;
    }

    fn read_element(&mut self, out: &mut [u8]) -> Result<(), ShuffleError> {
        let permutation = self
            .permutation
            .as_ref()
            .ok_or(ShuffleError::NotShuffled)?;
        let element_index = permutation[self.position];
        self.position += 1;
        if element_index >= self.element_count {
            out.fill(0);
            return Ok(());
        }
        let element = self.data[element_index]
            .take()
            .expect("each shuffled index is read at most once");
        out[..element.len()].copy_from_slice(&element);
        Ok(())
    }

    /// Read as many bytes as fit in `out`, straddling element boundaries
    /// across calls. Returns the number of bytes actually written, which is
    /// short only once the buffer is exhausted.
    pub fn read_next_chunk(&mut self, out: &mut [u8]) -> Result<usize, ShuffleError> {
        if self.permutation.is_none() {
            return Err(ShuffleError::NotShuffled);
        }
        let size = out.len();
        let mut written = 0;

        if self.element_length - self.pending_offset > 0 {
            let remainder = &self.pending[self.pending_offset..];
            let n = remainder.len().min(size);
            out[..n].copy_from_slice(&remainder[..n]);
            self.pending_offset += n;
            written += n;
        }

        while written < size && self.position < self.num_elements {
            if written + self.element_length > size {
                let mut pending = std::mem::take(&mut self.pending);
                self.read_element(&mut pending)?;
                let n = size - written;
                out[written..].copy_from_slice(&pending[..n]);
                self.pending = pending;
                self.pending_offset = n;
                written += n;
            } else {
                self.read_element(&mut out[written..written + self.element_length])?;
                written += self.element_length;
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shuffler() -> Shuffler {
        Shuffler::seeded([9u8; 32])
    }

    #[test]
    fn write_past_capacity_overflows() {
        let mut buf = ShuffleBuffer::new(4, 2);
        buf.write(&[1, 2, 3, 4]).unwrap();
        buf.write(&[5, 6, 7, 8]).unwrap();
        let result = buf.write(&[9, 9, 9, 9]);
        assert!(matches!(result, Err(ShuffleError::LinkOverflow(2))));
    }

    #[test]
    fn read_before_shuffle_errors() {
        let mut buf = ShuffleBuffer::new(4, 2);
        buf.write(&[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        assert!(matches!(
            buf.read_next_chunk(&mut out),
            Err(ShuffleError::NotShuffled)
        ));
    }

    #[test]
    fn without_dummies_reads_back_exactly_written_elements() {
        let mut buf = ShuffleBuffer::new(4, 10);
        buf.write(&[1, 1, 1, 1]).unwrap();
        buf.write(&[2, 2, 2, 2]).unwrap();
        buf.write(&[3, 3, 3, 3]).unwrap();
        buf.shuffle(&shuffler(), false);

        assert_eq!(buf.len_bytes(), 12);
        let mut out = vec![0u8; 12];
        let n = buf.read_next_chunk(&mut out).unwrap();
        assert_eq!(n, 12);

        let mut seen: Vec<u8> = out.chunks(4).map(|c| c[0]).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn with_dummies_pads_to_capacity_with_zeros() {
        let mut buf = ShuffleBuffer::new(4, 5);
        buf.write(&[7, 7, 7, 7]).unwrap();
        buf.shuffle(&shuffler(), true);

        assert_eq!(buf.len_bytes(), 20);
        let mut out = vec![0u8; 20];
        buf.read_next_chunk(&mut out).unwrap();

        let real_count = out.chunks(4).filter(|c| c[0] == 7).count();
        let dummy_count = out.chunks(4).filter(|c| c.iter().all(|&b| b == 0)).count();
        assert_eq!(real_count, 1);
        assert_eq!(dummy_count, 4);
    }

    #[test]
    fn read_next_chunk_straddles_element_boundaries() {
        let mut buf = ShuffleBuffer::new(4, 4);
        buf.write(&[1, 1, 1, 1]).unwrap();
        buf.write(&[2, 2, 2, 2]).unwrap();
        buf.shuffle(&shuffler(), false);

        let mut collected = Vec::new();
        let mut small = [0u8; 3];
        loop {
            let n = buf.read_next_chunk(&mut small).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&small[..n]);
        }
        assert_eq!(collected.len(), 8);
        let mut seen: Vec<u8> = collected.chunks(4).map(|c| c[0]).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn num_messages_counts_writes_not_capacity() {
        let mut buf = ShuffleBuffer::new(4, 10);
        buf.write(&[1, 1, 1, 1]).unwrap();
        buf.write(&[2, 2, 2, 2]).unwrap();
        assert_eq!(buf.num_messages(), 2);
    }
}
