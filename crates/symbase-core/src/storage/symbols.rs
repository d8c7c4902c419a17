//! Chunked, append-only string storage.

/// Size of one arena chunk in bytes.
pub const SYMBOL_CHUNK_SIZE: usize = 1024 * 1024;

/// Longest symbol stored, in bytes. Longer names are cut on a character boundary.
pub const MAX_SYMBOL_LEN: usize = 511;

/// Handle to a string stored in a [`SymbolArena`]
///
/// The handle stays valid for the lifetime of the arena. The empty string has
/// the handle [`SymbolRef::EMPTY`] and needs no storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolRef
{
    chunk: u32,
    start: u32,
    len: u32,
}

impl SymbolRef
{
    /// Handle of the empty string.
    pub const EMPTY: Self = Self {
        chunk: 0,
        start: 0,
        len: 0,
    };

    /// Length of the referenced string in bytes.
    #[must_use]
    pub const fn len(self) -> usize
    {
        self.len as usize
    }

    #[must_use]
    pub const fn is_empty(self) -> bool
    {
        self.len == 0
    }
}

/// Rewrite a name into the form it is stored in
///
/// `<`, `>` and `,` become `{`, `}` and `@`, spaces are dropped and the
/// result is cut to at most [`MAX_SYMBOL_LEN`] bytes. Template instances
/// like `Buffer<int, 4>` thereby turn into a single identifier-like token
/// (`Buffer{int@4}`) that survives the dotted label path syntax.
///
/// ## Example
///
/// ```rust
/// use symbase_core::storage::sanitize_symbol;
///
/// assert_eq!(sanitize_symbol("Buffer<int, 4>"), "Buffer{int@4}");
/// ```
#[must_use]
pub fn sanitize_symbol(name: &str) -> String
{
    let mut sanitized = String::with_capacity(name.len().min(MAX_SYMBOL_LEN));
    for c in name.chars() {
        let mapped = match c {
            ' ' => continue,
            '<' => '{',
            '>' => '}',
            ',' => '@',
            other => other,
        };
        if sanitized.len() + mapped.len_utf8() > MAX_SYMBOL_LEN {
            break;
        }
        sanitized.push(mapped);
    }
    sanitized
}

/// Append-only string arena
///
/// Strings are sanitized with [`sanitize_symbol`] and copied into chunks of
/// [`SYMBOL_CHUNK_SIZE`] bytes. A chunk is allocated with its full capacity
/// and a string is never split across chunks, so chunk buffers never
/// reallocate and stored strings never move.
#[derive(Debug, Default)]
pub struct SymbolArena
{
    chunks: Vec<String>,
}

impl SymbolArena
{
    #[must_use]
    pub const fn new() -> Self
    {
        Self { chunks: Vec::new() }
    }

    /// Sanitize and store `name`.
    pub fn intern(&mut self, name: &str) -> SymbolRef
    {
        let sanitized = sanitize_symbol(name);
        if sanitized.is_empty() {
            return SymbolRef::EMPTY;
        }

        let fits = self
            .chunks
            .last()
            .is_some_and(|chunk| chunk.capacity() - chunk.len() >= sanitized.len());
        if !fits {
            self.chunks.push(String::with_capacity(SYMBOL_CHUNK_SIZE));
        }

        let chunk_index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_index];
        let start = chunk.len();
        chunk.push_str(&sanitized);

        SymbolRef {
            chunk: chunk_index as u32,
            start: start as u32,
            len: sanitized.len() as u32,
        }
    }

    /// String behind a handle. Handles from another arena resolve to `""`.
    #[must_use]
    pub fn resolve(&self, symbol: SymbolRef) -> &str
    {
        if symbol.is_empty() {
            return "";
        }
        let start = symbol.start as usize;
        self.chunks
            .get(symbol.chunk as usize)
            .and_then(|chunk| chunk.get(start..start + symbol.len as usize))
            .unwrap_or("")
    }

    /// Number of chunks allocated so far.
    #[must_use]
    pub fn chunk_count(&self) -> usize
    {
        self.chunks.len()
    }

    /// Bytes of string data stored.
    #[must_use]
    pub fn bytes_used(&self) -> usize
    {
        self.chunks.iter().map(String::len).sum()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_sanitize_maps_template_characters()
    {
        assert_eq!(sanitize_symbol("std::map<int, float>"), "std::map{int@float}");
        assert_eq!(sanitize_symbol("  a b  "), "ab");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary()
    {
        let long = "x".repeat(600);
        assert_eq!(sanitize_symbol(&long).len(), MAX_SYMBOL_LEN);

        let wide = "ä".repeat(300);
        let cut = sanitize_symbol(&wide);
        assert!(cut.len() <= MAX_SYMBOL_LEN);
        assert_eq!(cut.len(), 510);
    }

    #[test]
    fn test_interned_strings_do_not_move()
    {
        let mut arena = SymbolArena::new();
        let first = arena.intern("Speed");
        let first_ptr = arena.resolve(first).as_ptr();

        let filler = "y".repeat(MAX_SYMBOL_LEN);
        for _ in 0..(SYMBOL_CHUNK_SIZE / MAX_SYMBOL_LEN + 10) {
            arena.intern(&filler);
        }

        assert!(arena.chunk_count() >= 2);
        assert_eq!(arena.resolve(first), "Speed");
        assert_eq!(arena.resolve(first).as_ptr(), first_ptr);
    }

    #[test]
    fn test_empty_names_need_no_storage()
    {
        let mut arena = SymbolArena::new();
        assert_eq!(arena.intern("   "), SymbolRef::EMPTY);
        assert_eq!(arena.resolve(SymbolRef::EMPTY), "");
        assert_eq!(arena.chunk_count(), 0);
    }
}
