use memchr::memchr2;

/// Finds the end of a JSON object or array in a buffer that may still be growing.
///
/// The buffer handed to [`ContainerScanner::scan`] must start at the opening bracket and
/// may only grow between calls; bytes already seen are not scanned again.
#[derive(Debug, Default)]
pub(crate) struct ContainerScanner {
    depth: usize,
    in_string: bool,
    escape: bool,
    scanned: usize,
}

impl ContainerScanner {
    /// Returns the length of the container, closing bracket included, once it is complete.
    pub(crate) fn scan(&mut self, buffer: &[u8]) -> Option<usize> {
        for (i, &c) in buffer.iter().enumerate().skip(self.scanned) {
            match (self.in_string, self.escape, c) {
                (true, false, b'\\') => self.escape = true,
                (true, true, _) => self.escape = false,
                (true, false, b'"') => self.in_string = false,
                (false, _, b'"') => self.in_string = true,
                (false, _, b'{' | b'[') => self.depth += 1,
                (false, _, b'}' | b']') => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.scanned = i + 1;
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
        self.scanned = buffer.len();
        None
    }
}

/// Finds the closing quote of a JSON string whose opening quote is `buffer[0]`.
#[derive(Debug)]
pub(crate) struct StringScanner {
    scanned: usize,
}

impl StringScanner {
    pub(crate) fn new() -> Self {
        Self { scanned: 1 }
    }

    /// Returns the length of the string token, both quotes included.
    pub(crate) fn scan(&mut self, buffer: &[u8]) -> Option<usize> {
        while let Some(offset) = memchr2(b'"', b'\\', &buffer[self.scanned..]) {
            let at = self.scanned + offset;
            if buffer[at] == b'"' {
                return Some(at + 1);
            }
            if at + 1 >= buffer.len() {
                // the escaped byte has not arrived yet
                self.scanned = at;
                return None;
            }
            self.scanned = at + 2;
        }
        self.scanned = buffer.len();
        None
    }
}

pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

/// Length of a number or literal at the start of `buffer`, if its terminator is buffered.
pub(crate) fn scalar_len(buffer: &[u8]) -> Option<usize> {
    buffer
        .iter()
        .position(|&c| is_whitespace(c) || matches!(c, b',' | b':' | b'}' | b']'))
}
