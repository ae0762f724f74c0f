//! File identities: the (extension, size, digest) triple used to decide
//! whether two files are duplicates, and its one-line text encoding.

use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use log::{debug, trace};
use serde::Deserialize;
use sha2::Digest;

use crate::error::{Error, Result};

/// Marks a file name without a `.`. Contains characters that cannot occur in
/// a file name, so it never collides with a real extension.
pub const NO_EXTENSION: &str = "\\:*/";

const FIELD_SEPARATOR: char = ';';

/// Digest functions a [`Fingerprinter`] can be built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum DigestAlgorithm {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
    Sha512Trunc256,
    Blake3,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 6] = [
        DigestAlgorithm::Sha224,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
        DigestAlgorithm::Sha512Trunc256,
        DigestAlgorithm::Blake3,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha224 => "SHA-224",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
            DigestAlgorithm::Sha512Trunc256 => "SHA-512/256",
            DigestAlgorithm::Blake3 => "BLAKE3",
        }
    }

    /// Digest length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha224 => 28,
            DigestAlgorithm::Sha256 | DigestAlgorithm::Sha512Trunc256 | DigestAlgorithm::Blake3 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    fn hasher(self) -> DigestState {
        match self {
            DigestAlgorithm::Sha224 => DigestState::Sha224(sha2::Sha224::new()),
            DigestAlgorithm::Sha256 => DigestState::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Sha384 => DigestState::Sha384(sha2::Sha384::new()),
            DigestAlgorithm::Sha512 => DigestState::Sha512(sha2::Sha512::new()),
            DigestAlgorithm::Sha512Trunc256 => DigestState::Sha512Trunc256(sha2::Sha512_256::new()),
            DigestAlgorithm::Blake3 => DigestState::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    /// Case-insensitive; `-` and `_` are ignored, so `sha256` and `SHA-256`
    /// name the same function.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = normalize_algorithm_name(s);
        DigestAlgorithm::ALL
            .into_iter()
            .find(|algorithm| normalize_algorithm_name(algorithm.name()) == wanted)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "algorithm \"{s}\" is invalid or not available (expected one of: {})",
                    DigestAlgorithm::ALL.map(DigestAlgorithm::name).join(", ")
                ))
            })
    }
}

impl TryFrom<String> for DigestAlgorithm {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

fn normalize_algorithm_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_'))
        .flat_map(char::to_uppercase)
        .collect()
}

enum DigestState {
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
    Sha512Trunc256(sha2::Sha512_256),
    Blake3(Box<blake3::Hasher>),
}

impl DigestState {
    fn update(&mut self, bytes: &[u8]) {
        match self {
            DigestState::Sha224(h) => h.update(bytes),
            DigestState::Sha256(h) => h.update(bytes),
            DigestState::Sha384(h) => h.update(bytes),
            DigestState::Sha512(h) => h.update(bytes),
            DigestState::Sha512Trunc256(h) => h.update(bytes),
            DigestState::Blake3(h) => {
                h.update(bytes);
            }
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            DigestState::Sha224(h) => h.finalize().to_vec(),
            DigestState::Sha256(h) => h.finalize().to_vec(),
            DigestState::Sha384(h) => h.finalize().to_vec(),
            DigestState::Sha512(h) => h.finalize().to_vec(),
            DigestState::Sha512Trunc256(h) => h.finalize().to_vec(),
            DigestState::Blake3(h) => h.finalize().as_bytes().to_vec(),
        }
    }
}

/// The fingerprint of a file's content class.
///
/// Two identities are equal only when size, extension (ignoring case) and
/// digest all agree. Digest equality alone is not trusted.
///
/// The extension is kept as the raw bytes of the file name, so names that are
/// not valid UTF-8 still compare by their actual bytes.
#[derive(Debug, Clone)]
pub struct FileIdentity {
    extension: Vec<u8>,
    /// Case-folded extension, the form used by `Eq` and `Hash`.
    folded: Vec<u8>,
    digest: Vec<u8>,
    size: u64,
}

impl FileIdentity {
    pub fn new(extension: impl Into<Vec<u8>>, digest: Vec<u8>, size: u64) -> Self {
        let extension = extension.into();
        Self {
            folded: fold_case(&extension),
            extension,
            digest,
            size,
        }
    }

    pub fn extension(&self) -> &[u8] {
        &self.extension
    }

    pub fn has_extension(&self) -> bool {
        self.extension != NO_EXTENSION.as_bytes()
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// `hex(digest);size;extension`, with the extension left empty when the
    /// file has none. The extension bytes are written unchanged.
    pub fn encode_bytes(&self) -> Vec<u8> {
        let mut record =
            format!("{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}", to_hex(&self.digest), self.size)
                .into_bytes();
        if self.has_extension() {
            record.extend_from_slice(&self.extension);
        }
        record
    }

    /// Text form of [`FileIdentity::encode_bytes`]. Lossy only for extensions
    /// that are not valid UTF-8.
    pub fn encode(&self) -> String {
        String::from_utf8_lossy(&self.encode_bytes()).into_owned()
    }

    /// Inverse of [`FileIdentity::encode`]. A missing or empty extension
    /// field decodes to [`NO_EXTENSION`].
    ///
    /// The separator is not escaped, so an extension containing `;` does not
    /// survive a round trip: everything after its first `;` is lost.
    pub fn decode(line: &str) -> Result<Self> {
        Self::decode_bytes(line.as_bytes())
    }

    /// Inverse of [`FileIdentity::encode_bytes`].
    pub fn decode_bytes(line: &[u8]) -> Result<Self> {
        let mut fields = line.split(|&b| b == FIELD_SEPARATOR as u8);
        let digest = fields.next().unwrap_or_default();
        let digest = std::str::from_utf8(digest)
            .map_err(|_| Error::format("digest is not hexadecimal"))
            .and_then(from_hex)?;
        if digest.is_empty() {
            return Err(Error::format("empty digest"));
        }
        let size = match fields.next() {
            Some(size) => {
                let size = String::from_utf8_lossy(size);
                size.trim()
                    .parse::<u64>()
                    .map_err(|_| Error::format(format!("size \"{size}\" is not a number")))?
            }
            None => return Err(Error::format("missing size field")),
        };
        let extension = match fields.next() {
            Some(extension) if !extension.is_empty() => extension,
            _ => NO_EXTENSION.as_bytes(),
        };
        Ok(Self::new(extension, digest, size))
    }
}

impl PartialEq for FileIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.folded == other.folded && self.digest == other.digest
    }
}

impl Eq for FileIdentity {}

impl Hash for FileIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.size.hash(state);
        self.folded.hash(state);
        self.digest.hash(state);
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Lower-cases UTF-8 extensions fully and anything else ASCII-only. Folding
/// keeps UTF-8 valid and invalid bytes invalid, so the two kinds never fold
/// to the same value.
fn fold_case(extension: &[u8]) -> Vec<u8> {
    match std::str::from_utf8(extension) {
        Ok(text) => text.to_lowercase().into_bytes(),
        Err(_) => extension.to_ascii_lowercase(),
    }
}

/// Bytes after the last `.` of the file name, or [`NO_EXTENSION`].
pub fn extension_of(path: &Path) -> Vec<u8> {
    let name = path
        .file_name()
        .map(|name| name.as_encoded_bytes())
        .unwrap_or_default();
    match name.iter().rposition(|&b| b == b'.') {
        Some(dot) => name[dot + 1..].to_vec(),
        None => NO_EXTENSION.as_bytes().to_vec(),
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn from_hex(hex: &str) -> Result<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err(Error::format(format!("digest \"{hex}\" has an odd number of digits")));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .filter(|pair| pair.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| Error::format(format!("digest \"{hex}\" is not hexadecimal")))
        })
        .collect()
}

/// Computes [`FileIdentity`] values with one digest function chosen at
/// construction.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    algorithm: DigestAlgorithm,
}

impl Fingerprinter {
    const BUFFER_SIZE: usize = 8192;

    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Streams the file at `path` through the digest. `size_hint` is only
    /// used for logging; the identity records the number of bytes actually
    /// read. A read failure discards the partial digest.
    pub fn compute_identity(&self, path: &Path, size_hint: u64) -> Result<FileIdentity> {
        trace!("Fingerprinting '{}' ({} bytes expected)", path.display(), size_hint);
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let identity = self
            .identity_from_reader(BufReader::new(file), extension_of(path))
            .map_err(|e| Error::io(path, e))?;
        if identity.size != size_hint {
            debug!(
                "'{}' changed size while reading ({} -> {} bytes)",
                path.display(),
                size_hint,
                identity.size
            );
        }
        Ok(identity)
    }

    pub fn identity_from_reader<R: Read>(
        &self,
        mut reader: R,
        extension: Vec<u8>,
    ) -> std::io::Result<FileIdentity> {
        let mut state = self.algorithm.hasher();
        let mut buffer = [0; Self::BUFFER_SIZE];
        let mut size = 0u64;

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            state.update(&buffer[..bytes_read]);
            size += bytes_read as u64;
        }

        Ok(FileIdentity::new(extension, state.finalize(), size))
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(DigestAlgorithm::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Cursor;

    fn identity(content: &[u8], extension: &str) -> FileIdentity {
        Fingerprinter::default()
            .identity_from_reader(Cursor::new(content), extension.as_bytes().to_vec())
            .unwrap()
    }

    #[test]
    fn sha256_of_known_input() {
        let id = identity(b"abc", "txt");
        assert_eq!(
            to_hex(id.digest()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(id.size(), 3);
    }

    #[test]
    fn digest_lengths_match_algorithm() {
        for algorithm in DigestAlgorithm::ALL {
            let id = Fingerprinter::new(algorithm)
                .identity_from_reader(Cursor::new(b"hello"), "bin".into())
                .unwrap();
            assert_eq!(id.digest().len(), algorithm.output_len(), "{algorithm}");
        }
    }

    #[test]
    fn extension_case_is_ignored_for_equality_and_hash() {
        let a = identity(b"hi", "TXT");
        let b = identity(b"hi", "txt");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        assert!(set.insert(a));
        assert!(!set.insert(b));
    }

    #[test]
    fn different_extensions_never_collide() {
        assert_ne!(identity(b"hi", "txt"), identity(b"hi", "bin"));
        assert_ne!(identity(b"hi", "txt"), identity(b"hi", NO_EXTENSION));
    }

    #[test]
    fn equal_digest_with_different_size_is_not_equal() {
        let digest = vec![0xab; 32];
        let a = FileIdentity::new("txt", digest.clone(), 10);
        let b = FileIdentity::new("txt", digest, 11);
        assert_ne!(a, b);
    }

    #[test]
    fn encode_format() {
        let id = FileIdentity::new("Txt", vec![0x00, 0x0f, 0xa0, 0xff], 42);
        assert_eq!(id.encode(), "000fa0ff;42;Txt");

        let bare = FileIdentity::new(NO_EXTENSION, vec![0x01], 1);
        assert_eq!(bare.encode(), "01;1;");
    }

    #[test]
    fn decode_restores_identity_exactly() {
        let id = identity(b"some content", "JPEG");
        let decoded = FileIdentity::decode(&id.encode()).unwrap();
        assert_eq!(decoded, id);
        assert_eq!(decoded.extension(), b"JPEG");
        assert_eq!(decoded.digest(), id.digest());
        assert_eq!(decoded.size(), id.size());

        let bare = identity(b"x", NO_EXTENSION);
        let decoded = FileIdentity::decode(&bare.encode()).unwrap();
        assert_eq!(decoded.extension(), NO_EXTENSION.as_bytes());
        assert_eq!(decoded, bare);
    }

    #[test]
    fn decode_without_extension_field_uses_sentinel() {
        let id = FileIdentity::decode("abcd;12").unwrap();
        assert!(!id.has_extension());
        assert_eq!(id.size(), 12);
        assert_eq!(id.digest(), &[0xab, 0xcd]);
    }

    #[test]
    fn decode_rejects_malformed_lines() {
        assert!(matches!(FileIdentity::decode("xyz;1;txt"), Err(Error::Format(_))));
        assert!(matches!(FileIdentity::decode("abc;1;txt"), Err(Error::Format(_))));
        assert!(matches!(FileIdentity::decode("abcd;-1;txt"), Err(Error::Format(_))));
        assert!(matches!(FileIdentity::decode("abcd;ten;txt"), Err(Error::Format(_))));
        assert!(matches!(FileIdentity::decode("abcd"), Err(Error::Format(_))));
    }

    #[test]
    fn decode_rejects_empty_digest() {
        assert!(matches!(FileIdentity::decode(";3;txt"), Err(Error::Format(_))));
        assert!(matches!(FileIdentity::decode(" ;3;"), Err(Error::Format(_))));
    }

    #[test]
    fn non_utf8_extensions_compare_by_bytes() {
        let a = FileIdentity::new(b"\xff".to_vec(), vec![1; 32], 4);
        let b = FileIdentity::new(b"\xfe".to_vec(), vec![1; 32], 4);
        assert_ne!(a, b);

        let upper = FileIdentity::new(b"T\xffT".to_vec(), vec![1; 32], 4);
        let lower = FileIdentity::new(b"t\xfft".to_vec(), vec![1; 32], 4);
        assert_eq!(upper, lower);

        let mut set = HashSet::new();
        assert!(set.insert(a));
        assert!(set.insert(b));
        assert!(set.insert(upper));
        assert!(!set.insert(lower));
    }

    #[test]
    fn encode_bytes_keeps_raw_extension() {
        let id = FileIdentity::new(b"d\xe9j".to_vec(), vec![0xab], 9);
        assert_eq!(id.encode_bytes(), b"ab;9;d\xe9j".to_vec());
        let decoded = FileIdentity::decode_bytes(&id.encode_bytes()).unwrap();
        assert_eq!(decoded.extension(), b"d\xe9j");
        assert_eq!(decoded, id);
    }

    #[test]
    fn unicode_extensions_ignore_case() {
        assert_eq!(
            FileIdentity::new("ÉTÉ", vec![2; 32], 1),
            FileIdentity::new("été", vec![2; 32], 1)
        );
    }

    #[test]
    fn semicolon_in_extension_is_truncated() {
        let id = FileIdentity::new("a;b", vec![0x01], 1);
        let decoded = FileIdentity::decode(&id.encode()).unwrap();
        assert_eq!(decoded.extension(), b"a");
    }

    #[test]
    fn extension_is_text_after_last_dot() {
        assert_eq!(extension_of(Path::new("/x/archive.tar.GZ")), b"GZ");
        assert_eq!(extension_of(Path::new("/x/.bashrc")), b"bashrc");
        assert_eq!(extension_of(Path::new("/x/Makefile")), NO_EXTENSION.as_bytes());
        assert!(extension_of(Path::new("/x/trailing.")).is_empty());
    }

    #[test]
    fn algorithm_names_parse_loosely() {
        assert_eq!("sha256".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha256);
        assert_eq!("SHA-512".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha512);
        assert_eq!("sha-512/256".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha512Trunc256);
        assert_eq!("Blake3".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Blake3);
    }

    #[test]
    fn unknown_algorithm_is_a_configuration_error() {
        let err = "MD5".parse::<DigestAlgorithm>().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("MD5"));
    }

    #[test]
    fn compute_identity_reports_missing_file_as_io_error() {
        let err = Fingerprinter::default()
            .compute_identity(Path::new("/definitely/not/here.txt"), 0)
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
