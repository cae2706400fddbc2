use {
    super::{Buffer, Error},
    std::{fmt, str::FromStr},
};

/// Narrow encoding of text.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Encoding
{
    Utf8,
    Ascii,
    Latin1,
}

/// Text in some encoding.
#[derive(Debug)]
pub enum Encoded
{
    /// The UTF-8 bytes of the text already are the encoded form.
    Unchanged,

    /// The text had to be transcoded into a new buffer.
    Transcoded(Buffer),
}

impl Encoding
{
    /// The canonical name of the encoding.
    pub fn name(self) -> &'static str
    {
        match self {
            Self::Utf8   => "utf-8",
            Self::Ascii  => "ascii",
            Self::Latin1 => "latin-1",
        }
    }

    /// One past the largest code point the encoding can represent.
    pub fn limit(self) -> u32
    {
        match self {
            Self::Utf8   => 0x110000,
            Self::Ascii  => 0x80,
            Self::Latin1 => 0x100,
        }
    }

    /// Encode text.
    ///
    /// No copy is made when the UTF-8 bytes of the text
    /// are also its encoded form, which is always the case for UTF-8
    /// and for text that consists only of ASCII characters.
    pub fn encode(self, text: &str) -> Result<Encoded, Error>
    {
        if self == Self::Utf8 || text.is_ascii() {
            return Ok(Encoded::Unchanged);
        }

        let unrepresentable = text.chars().enumerate()
            .find(|&(_, character)| u32::from(character) >= self.limit());
        if let Some((position, character)) = unrepresentable {
            return Err(Error::Encode{encoding: self, character, position});
        }

        // Only Latin-1 gets here, where every character fits in one byte.
        let len = text.chars().count();
        let buffer = Buffer::from_fn(len, |buf| {
            for (byte, character) in buf.iter_mut().zip(text.chars()) {
                *byte = u32::from(character) as u8;
            }
        });

        Ok(Encoded::Transcoded(buffer))
    }
}

impl FromStr for Encoding
{
    type Err = Error;

    /// Look up an encoding by name.
    ///
    /// Names are case-insensitive and underscores count as hyphens.
    fn from_str(name: &str) -> Result<Self, Self::Err>
    {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" | "u8" =>
                Ok(Self::Utf8),
            "ascii" | "us-ascii" | "646" =>
                Ok(Self::Ascii),
            "latin-1" | "latin1" | "l1" | "iso-8859-1" | "iso8859-1" =>
                Ok(Self::Latin1),
            _ =>
                Err(Error::UnknownEncoding(name.to_owned())),
        }
    }
}

impl fmt::Display for Encoding
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::ErrorKind,
        proptest::{char::range as pchar, collection::vec as pvec, proptest},
    };

    #[test]
    fn lookup_aliases()
    {
        assert_eq!("UTF_8".parse::<Encoding>(), Ok(Encoding::Utf8));
        assert_eq!("us-ascii".parse::<Encoding>(), Ok(Encoding::Ascii));
        assert_eq!("ISO-8859-1".parse::<Encoding>(), Ok(Encoding::Latin1));

        let error = "ebcdic".parse::<Encoding>().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Lookup);
    }

    #[test]
    fn ascii_rejects_first_non_ascii_character()
    {
        let error = Encoding::Ascii.encode("naïve café").unwrap_err();
        assert_eq!(
            error,
            Error::Encode{encoding: Encoding::Ascii, character: 'ï', position: 2},
        );
        assert_eq!(
            error.to_string(),
            "'ascii' codec can't encode character 'ï' \
             in position 2: ordinal not in range(128)",
        );
    }

    #[test]
    fn latin1_rejects_wide_characters()
    {
        let error = Encoding::Latin1.encode("h€llo").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Encode);
    }

    #[test]
    fn ascii_text_is_never_copied()
    {
        for encoding in [Encoding::Utf8, Encoding::Ascii, Encoding::Latin1] {
            assert!(matches!(encoding.encode("hello"), Ok(Encoded::Unchanged)));
        }
    }

    proptest!
    {
        #[test]
        fn latin1_maps_characters_to_bytes(
            chars in pvec(pchar('\u{0}', '\u{FF}'), 0 .. 50),
        )
        {
            let text: String = chars.iter().collect();
            let expected: Vec<u8> = chars.iter().map(|&c| c as u8).collect();
            match Encoding::Latin1.encode(&text).unwrap() {
                Encoded::Unchanged => assert_eq!(text.as_bytes(), &expected[..]),
                Encoded::Transcoded(buffer) => assert_eq!(buffer.as_bytes(), &expected[..]),
            }
        }
    }
}
