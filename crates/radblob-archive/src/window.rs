use std::io::{self, Read, Seek, SeekFrom, Write};

/// A byte window `[start, end)` over a seekable handle.
///
/// Lets an archive live inside a larger container file: positions seen by the
/// ZIP codec are relative to `start`, reads stop at `end`, and writes past
/// `end` grow the window. An open-ended window runs to the end of the handle.
#[derive(Debug)]
pub struct ArchiveWindow<F> {
    inner: F,
    start: u64,
    end: Option<u64>,
    pos: u64,
}

impl<F: Seek> ArchiveWindow<F> {
    /// Wrap `inner`, starting at absolute offset `start`. `len` bounds the
    /// window; `None` leaves it open-ended.
    pub fn new(mut inner: F, start: u64, len: Option<u64>) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self {
            inner,
            start,
            end: len.map(|len| start + len),
            pos: 0,
        })
    }

    /// Current length of the window in bytes.
    pub fn len(&mut self) -> io::Result<u64> {
        match self.end {
            Some(end) => Ok(end - self.start),
            None => {
                let total = self.inner.seek(SeekFrom::End(0))?;
                self.inner.seek(SeekFrom::Start(self.start + self.pos))?;
                Ok(total.saturating_sub(self.start))
            }
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: Read> Read for ArchiveWindow<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let buf = match self.end {
            Some(end) => {
                let remaining = end.saturating_sub(self.start + self.pos);
                let limit = remaining.min(buf.len() as u64) as usize;
                &mut buf[..limit]
            }
            None => buf,
        };
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<F: Write> Write for ArchiveWindow<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.pos += n as u64;
        if let Some(end) = self.end {
            self.end = Some(end.max(self.start + self.pos));
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<F: Seek> Seek for ArchiveWindow<F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len()?.checked_add_signed(delta),
        };
        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of archive window",
            ));
        };
        self.inner.seek(SeekFrom::Start(self.start + target))?;
        self.pos = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn bounded_window_reads_only_its_range() {
        let data = Cursor::new(b"headBODYtail".to_vec());
        let mut window = ArchiveWindow::new(data, 4, Some(4)).unwrap();
        let mut out = String::new();
        window.read_to_string(&mut out).unwrap();
        assert_eq!(out, "BODY");
        assert_eq!(window.len().unwrap(), 4);
    }

    #[test]
    fn seek_is_relative_to_window() {
        let data = Cursor::new(b"xxABCDEF".to_vec());
        let mut window = ArchiveWindow::new(data, 2, None).unwrap();
        assert_eq!(window.seek(SeekFrom::End(-2)).unwrap(), 4);
        let mut out = [0u8; 2];
        window.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"EF");
        assert!(window.seek(SeekFrom::Current(-10)).is_err());
    }

    #[test]
    fn writes_past_end_grow_window() {
        let data = Cursor::new(b"pre1234".to_vec());
        let mut window = ArchiveWindow::new(data, 3, Some(4)).unwrap();
        window.seek(SeekFrom::End(0)).unwrap();
        window.write_all(b"5678").unwrap();
        assert_eq!(window.len().unwrap(), 8);
        assert_eq!(window.into_inner().into_inner(), b"pre12345678");
    }

    #[test]
    fn open_window_tracks_inner_length() {
        let data = Cursor::new(b"ab".to_vec());
        let mut window = ArchiveWindow::new(data, 1, None).unwrap();
        assert_eq!(window.len().unwrap(), 1);
        window.seek(SeekFrom::End(0)).unwrap();
        window.write_all(b"cd").unwrap();
        assert_eq!(window.len().unwrap(), 3);
        assert_eq!(window.start(), 1);
    }
}
