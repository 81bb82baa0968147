//! The text-format lexer.
//!
//! One token per call over a borrowed byte slice, with precise locations.
//! Character classes are a 128-byte table; keywords are recognised by
//! scanning the maximal run of reserved characters first and looking the
//! whole word up, which is what makes a keyword followed by more reserved
//! characters collapse into a single `Reserved` token.

mod keywords;
mod token;

pub use token::{Keyword, LiteralInfo, LiteralKind, OpcodeInfo, Sign, Token, TokenKind};

use crate::Location;

const RESERVED: u8 = 1;
const KEYWORD: u8 = 2;
const HEX_DIGIT: u8 = 4;
const DIGIT: u8 = 8;

const fn build_char_classes() -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut c = 0;
    while c < 128 {
        let ch = c as u8;
        let mut class = 0;
        let printable = ch > b' ' && ch < 0x7f;
        let punctuation = matches!(ch, b'"' | b'(' | b')' | b',' | b';' | b'[' | b']' | b'{' | b'}');
        if printable && !punctuation {
            class |= RESERVED;
        }
        if ch.is_ascii_lowercase() {
            class |= KEYWORD;
        }
        if ch.is_ascii_digit() {
            class |= DIGIT | HEX_DIGIT;
        }
        if matches!(ch, b'a'..=b'f' | b'A'..=b'F') {
            class |= HEX_DIGIT;
        }
        table[c] = class;
        c += 1;
    }
    table
}

static CHAR_CLASSES: [u8; 128] = build_char_classes();

#[inline]
fn class(byte: u8) -> u8 {
    if byte < 0x80 {
        CHAR_CLASSES[byte as usize]
    } else {
        0
    }
}

#[inline]
fn is_reserved(byte: u8) -> bool {
    class(byte) & RESERVED != 0
}

#[inline]
fn is_digit(byte: u8) -> bool {
    class(byte) & DIGIT != 0
}

#[inline]
fn is_hex_digit(byte: u8) -> bool {
    class(byte) & HEX_DIGIT != 0
}

/// Lex a single token off the front of `data`, returning it and the rest of
/// the input.
pub fn lex(data: &[u8]) -> (Token, &[u8]) {
    let mut lexer = Lexer::new(data);
    let token = lexer.lex();
    (token, &data[lexer.pos..])
}

/// The lexer: a cursor over a borrowed byte slice.
#[derive(Debug)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn token(&self, start: usize, kind: TokenKind) -> Token {
        Token {
            loc: Location::span(start, self.pos),
            kind,
        }
    }

    /// Read one token. At the end of input an `Eof` token is returned; every
    /// other call consumes at least one byte.
    pub fn lex(&mut self) -> Token {
        let start = self.pos;
        let Some(byte) = self.peek() else {
            return self.token(start, TokenKind::Eof);
        };
        match byte {
            b'(' => match self.peek_at(1) {
                Some(b';') => self.lex_block_comment(start),
                Some(b'@') => {
                    self.pos += 2;
                    while self.peek().is_some_and(is_reserved) {
                        self.pos += 1;
                    }
                    self.token(start, TokenKind::LparAnn)
                }
                _ => {
                    self.pos += 1;
                    self.token(start, TokenKind::Lpar)
                }
            },
            b')' => {
                self.pos += 1;
                self.token(start, TokenKind::Rpar)
            }
            b';' => {
                if self.peek_at(1) == Some(b';') {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.pos += 1;
                    }
                    if self.peek().is_some() {
                        self.pos += 1;
                    }
                    self.token(start, TokenKind::LineComment)
                } else {
                    self.pos += 1;
                    self.token(start, TokenKind::InvalidChar)
                }
            }
            b' ' | b'\t' | b'\r' | b'\n' => {
                while self
                    .peek()
                    .is_some_and(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
                {
                    self.pos += 1;
                }
                self.token(start, TokenKind::Whitespace)
            }
            b'"' => self.lex_text(start),
            byte if is_reserved(byte) => self.lex_reserved_word(start),
            _ => {
                self.pos += 1;
                self.token(start, TokenKind::InvalidChar)
            }
        }
    }

    /// Read one token, skipping whitespace and comments.
    pub fn lex_no_whitespace(&mut self) -> Token {
        loop {
            let token = self.lex();
            if !token.kind.is_trivia() {
                return token;
            }
        }
    }

    fn lex_block_comment(&mut self, start: usize) -> Token {
        self.pos += 2;
        let mut nesting = 1u32;
        loop {
            match self.peek() {
                None => return self.token(start, TokenKind::InvalidBlockComment),
                Some(b'(') if self.peek_at(1) == Some(b';') => {
                    self.pos += 2;
                    nesting += 1;
                }
                Some(b';') if self.peek_at(1) == Some(b')') => {
                    self.pos += 2;
                    nesting -= 1;
                    if nesting == 0 {
                        return self.token(start, TokenKind::BlockComment);
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn lex_text(&mut self, start: usize) -> Token {
        self.pos += 1;
        let mut has_error = false;
        let mut decoded_len = 0u32;
        loop {
            match self.peek() {
                None => {
                    has_error = true;
                    break;
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\n') => {
                    has_error = true;
                    self.pos += 1;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b't' | b'n' | b'r' | b'"' | b'\'' | b'\\') => {
                            self.pos += 1;
                            decoded_len += 1;
                        }
                        Some(byte) if is_hex_digit(byte) => {
                            self.pos += 1;
                            if self.peek().is_some_and(is_hex_digit) {
                                self.pos += 1;
                                decoded_len += 1;
                            } else {
                                has_error = true;
                            }
                        }
                        Some(_) => {
                            self.pos += 1;
                            has_error = true;
                        }
                        None => has_error = true,
                    }
                }
                Some(_) => {
                    self.pos += 1;
                    decoded_len += 1;
                }
            }
        }
        if has_error {
            self.token(start, TokenKind::InvalidText)
        } else {
            self.token(start, TokenKind::Text { decoded_len })
        }
    }

    fn lex_reserved_word(&mut self, start: usize) -> Token {
        while self.peek().is_some_and(is_reserved) {
            self.pos += 1;
        }
        let word = &self.data[start..self.pos];
        let kind = classify_word(word);
        self.token(start, kind)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let token = self.lex();
        (token.kind != TokenKind::Eof).then_some(token)
    }
}

fn classify_word(word: &[u8]) -> TokenKind {
    if word[0] == b'$' {
        return if word.len() > 1 {
            TokenKind::Id
        } else {
            TokenKind::Reserved
        };
    }
    if let Some(kind) = classify_number(word) {
        return kind;
    }
    if let Some(rest) = word.strip_prefix(b"offset=") {
        if let Some(info) = classify_nat(rest) {
            return TokenKind::OffsetEqNat(info);
        }
    }
    if let Some(rest) = word.strip_prefix(b"align=") {
        if let Some(info) = classify_nat(rest) {
            return TokenKind::AlignEqNat(info);
        }
    }
    // Reserved characters are printable ASCII, so the word is valid UTF-8.
    if let Some(kind) = std::str::from_utf8(word).ok().and_then(keywords::lookup) {
        return kind;
    }
    TokenKind::Reserved
}

/// Scan a run of digits with optional `_` separators. A separator must sit
/// between two digits.
fn scan_num(word: &[u8], pos: &mut usize, digit: fn(u8) -> bool, underscores: &mut bool) -> bool {
    let mut ok = false;
    while *pos < word.len() && digit(word[*pos]) {
        *pos += 1;
        if *pos < word.len() && word[*pos] == b'_' {
            *pos += 1;
            *underscores = true;
            ok = false;
        } else {
            ok = true;
        }
    }
    ok
}

/// Recognise `word` as a numeric literal, requiring the whole word to match.
fn classify_number(word: &[u8]) -> Option<TokenKind> {
    use LiteralKind::*;

    let mut pos = 0;
    let sign = match word[0] {
        b'+' => {
            pos += 1;
            Sign::Plus
        }
        b'-' => {
            pos += 1;
            Sign::Minus
        }
        _ => Sign::None,
    };
    let signed = sign != Sign::None;
    let rest = &word[pos..];

    if rest == b"inf" {
        return Some(TokenKind::Float(LiteralInfo::new(sign, Infinity, false)));
    }
    if rest == b"nan" {
        return Some(TokenKind::Float(LiteralInfo::new(sign, Nan, false)));
    }
    if let Some(payload) = rest.strip_prefix(b"nan:0x") {
        let mut p = 0;
        let mut underscores = false;
        if !payload.is_empty()
            && scan_num(payload, &mut p, is_hex_digit, &mut underscores)
            && p == payload.len()
        {
            return Some(TokenKind::Float(LiteralInfo::new(
                sign,
                NanPayload,
                underscores,
            )));
        }
        return None;
    }

    let mut underscores = false;
    if rest.starts_with(b"0x") {
        pos += 2;
        let mut float = false;
        if !scan_num(word, &mut pos, is_hex_digit, &mut underscores) {
            return None;
        }
        if pos < word.len() && word[pos] == b'.' {
            pos += 1;
            float = true;
            if pos < word.len()
                && is_hex_digit(word[pos])
                && !scan_num(word, &mut pos, is_hex_digit, &mut underscores)
            {
                return None;
            }
        }
        if pos < word.len() && matches!(word[pos], b'p' | b'P') {
            pos += 1;
            float = true;
            if pos < word.len() && matches!(word[pos], b'+' | b'-') {
                pos += 1;
            }
            if !scan_num(word, &mut pos, is_digit, &mut underscores) {
                return None;
            }
        }
        if pos != word.len() {
            return None;
        }
        let info = LiteralInfo::new(sign, if float { HexFloat } else if signed { HexInt } else { HexNat }, underscores);
        return Some(match (float, signed) {
            (true, _) => TokenKind::Float(info),
            (false, true) => TokenKind::Int(info),
            (false, false) => TokenKind::Nat(info),
        });
    }

    if !rest.first().copied().is_some_and(is_digit) {
        return None;
    }
    let mut float = false;
    if !scan_num(word, &mut pos, is_digit, &mut underscores) {
        return None;
    }
    if pos < word.len() && word[pos] == b'.' {
        pos += 1;
        float = true;
        if pos < word.len()
            && is_digit(word[pos])
            && !scan_num(word, &mut pos, is_digit, &mut underscores)
        {
            return None;
        }
    }
    if pos < word.len() && matches!(word[pos], b'e' | b'E') {
        pos += 1;
        float = true;
        if pos < word.len() && matches!(word[pos], b'+' | b'-') {
            pos += 1;
        }
        if !scan_num(word, &mut pos, is_digit, &mut underscores) {
            return None;
        }
    }
    if pos != word.len() {
        return None;
    }
    let info = LiteralInfo::new(sign, if float { Float } else if signed { Int } else { Nat }, underscores);
    Some(match (float, signed) {
        (true, _) => TokenKind::Float(info),
        (false, true) => TokenKind::Int(info),
        (false, false) => TokenKind::Nat(info),
    })
}

/// Recognise an unsigned decimal or hex natural, as used by `offset=` and
/// `align=`.
fn classify_nat(digits: &[u8]) -> Option<LiteralInfo> {
    let mut underscores = false;
    let mut pos = 0;
    let (scanner, kind): (fn(u8) -> bool, LiteralKind) = if digits.starts_with(b"0x") {
        pos = 2;
        (is_hex_digit, LiteralKind::HexNat)
    } else {
        (is_digit, LiteralKind::Nat)
    };
    if scan_num(digits, &mut pos, scanner, &mut underscores) && pos == digits.len() {
        Some(LiteralInfo::new(Sign::None, kind, underscores))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{instr::Opcode, RefType, ValType};

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src.as_bytes()).map(|t| t.kind).collect()
    }

    fn single(src: &str) -> TokenKind {
        let tokens = kinds(src);
        assert_eq!(tokens.len(), 1, "{src}: {tokens:?}");
        tokens[0]
    }

    #[test]
    fn punctuation_and_ids() {
        assert_eq!(
            kinds("($foo))"),
            vec![
                TokenKind::Lpar,
                TokenKind::Id,
                TokenKind::Rpar,
                TokenKind::Rpar
            ]
        );
        assert_eq!(single("$"), TokenKind::Reserved);
        assert_eq!(single("$foo!bar"), TokenKind::Id);
    }

    #[test]
    fn annotations() {
        let (token, rest) = lex(b"(@custom \"x\")");
        assert_eq!(token.kind, TokenKind::LparAnn);
        assert_eq!(token.loc, Location::new(0, 8));
        assert_eq!(rest, b" \"x\")");
    }

    #[test]
    fn comments_nest() {
        assert_eq!(single("(; a (; b ;) c ;)"), TokenKind::BlockComment);
        assert_eq!(single("(; unterminated (;"), TokenKind::InvalidBlockComment);
        assert_eq!(
            kinds(";; to the end\nx"),
            vec![TokenKind::LineComment, TokenKind::Reserved]
        );
    }

    #[test]
    fn strings() {
        let token = Lexer::new(b"\"ab\\n\\7f\"").lex();
        assert_eq!(token.kind, TokenKind::Text { decoded_len: 4 });
        assert_eq!(token.loc.len, 9);
        assert_eq!(single("\"bad\\q\""), TokenKind::InvalidText);
        assert_eq!(single("\"no closing quote"), TokenKind::InvalidText);
        assert_eq!(
            kinds("\"line\nbreak\" x"),
            vec![
                TokenKind::InvalidText,
                TokenKind::Whitespace,
                TokenKind::Reserved
            ]
        );
    }

    #[test]
    fn numbers() {
        use LiteralKind::*;
        assert_eq!(
            single("123"),
            TokenKind::Nat(LiteralInfo::new(Sign::None, Nat, false))
        );
        assert_eq!(
            single("1_000"),
            TokenKind::Nat(LiteralInfo::new(Sign::None, Nat, true))
        );
        assert_eq!(
            single("-42"),
            TokenKind::Int(LiteralInfo::new(Sign::Minus, Int, false))
        );
        assert_eq!(
            single("0xdead_beef"),
            TokenKind::Nat(LiteralInfo::new(Sign::None, HexNat, true))
        );
        assert_eq!(
            single("+0x1f"),
            TokenKind::Int(LiteralInfo::new(Sign::Plus, HexInt, false))
        );
        assert_eq!(
            single("1.5e-3"),
            TokenKind::Float(LiteralInfo::new(Sign::None, Float, false))
        );
        assert_eq!(
            single("1."),
            TokenKind::Float(LiteralInfo::new(Sign::None, Float, false))
        );
        assert_eq!(
            single("0x1.8p4"),
            TokenKind::Float(LiteralInfo::new(Sign::None, HexFloat, false))
        );
        assert_eq!(
            single("-inf"),
            TokenKind::Float(LiteralInfo::new(Sign::Minus, Infinity, false))
        );
        assert_eq!(
            single("nan"),
            TokenKind::Float(LiteralInfo::new(Sign::None, Nan, false))
        );
        assert_eq!(
            single("nan:0x7ff"),
            TokenKind::Float(LiteralInfo::new(Sign::None, NanPayload, false))
        );
        // Malformed numbers fall back to Reserved.
        assert_eq!(single("1_"), TokenKind::Reserved);
        assert_eq!(single("1__2"), TokenKind::Reserved);
        assert_eq!(single("0x"), TokenKind::Reserved);
        assert_eq!(single("1.5.3"), TokenKind::Reserved);
        assert_eq!(single("nan:0x"), TokenKind::Reserved);
        assert_eq!(single("1e"), TokenKind::Reserved);
    }

    #[test]
    fn offset_and_align() {
        assert!(matches!(single("offset=16"), TokenKind::OffsetEqNat(_)));
        assert!(matches!(single("align=0x8"), TokenKind::AlignEqNat(_)));
        assert_eq!(single("offset=x"), TokenKind::Reserved);
        assert_eq!(single("align="), TokenKind::Reserved);
        // Bare `offset` is a structural keyword.
        assert_eq!(single("offset"), TokenKind::Keyword(Keyword::Offset));
    }

    #[test]
    fn keywords_and_types() {
        assert_eq!(single("module"), TokenKind::Keyword(Keyword::Module));
        assert_eq!(single("i32"), TokenKind::ValueType(ValType::I32));
        assert_eq!(single("funcref"), TokenKind::ReferenceType(RefType::Func));
        assert_eq!(single("anyref"), TokenKind::ReferenceType(RefType::Extern));
        assert_eq!(single("nullref"), TokenKind::ReferenceType(RefType::Null));
        assert_eq!(single("end"), TokenKind::Keyword(Keyword::End));
    }

    #[test]
    fn instructions() {
        let TokenKind::BareInstr(info) = single("i32.add") else {
            panic!()
        };
        assert_eq!(info.opcode, Opcode::I32Add);
        assert!(info.features.is_empty());

        assert!(matches!(single("block"), TokenKind::BlockInstr(_)));
        assert!(matches!(single("local.get"), TokenKind::VarInstr(_)));
        assert!(matches!(single("i64.load32_u"), TokenKind::MemoryInstr(_)));
        assert!(matches!(single("br_table"), TokenKind::BrTableInstr(_)));
        assert!(matches!(single("select"), TokenKind::SelectInstr(_)));
        assert!(matches!(
            single("v8x16.shuffle"),
            TokenKind::SimdShuffleInstr(_)
        ));
        assert!(matches!(
            single("i8x16.extract_lane_s"),
            TokenKind::SimdLaneInstr(_)
        ));
        assert!(matches!(single("v128.const"), TokenKind::SimdConstInstr(_)));
        assert!(matches!(single("ref.null"), TokenKind::RefNullInstr(_)));
        assert!(matches!(single("table.init"), TokenKind::TableInitInstr(_)));

        let TokenKind::MemoryInstr(info) = single("i32.atomic.rmw8.add_u") else {
            panic!()
        };
        assert_eq!(info.features, crate::Features::THREADS);
    }

    #[test]
    fn legacy_spellings_map_to_canonical_opcodes() {
        let canonical = single("i32.trunc_f32_s").opcode_info().unwrap();
        let legacy = single("i32.trunc_s/f32").opcode_info().unwrap();
        assert_eq!(canonical.opcode, Opcode::I32TruncF32S);
        assert_eq!(legacy.opcode, canonical.opcode);

        assert_eq!(
            single("i32.reinterpret/f32").opcode_info().unwrap().opcode,
            Opcode::I32ReinterpretF32
        );
        assert_eq!(
            single("i32.trunc_s:sat/f32").opcode_info().unwrap().opcode,
            Opcode::I32TruncSatF32S
        );
        assert_eq!(
            single("get_local").opcode_info().unwrap().opcode,
            Opcode::LocalGet
        );
        assert_eq!(
            single("grow_memory").opcode_info().unwrap().opcode,
            Opcode::MemoryGrow
        );
    }

    #[test]
    fn trailing_reserved_characters_poison_a_keyword() {
        assert_eq!(single("i32.addx"), TokenKind::Reserved);
        assert_eq!(single("123abc"), TokenKind::Reserved);
        assert_eq!(single("module!"), TokenKind::Reserved);
    }

    #[test]
    fn lexing_is_total_and_advances() {
        let inputs: [&[u8]; 5] = [
            b"\x00\x01\x02",
            b"\xff\xfe",
            b"(((((",
            b"\"\\",
            b"; , [ ] { }",
        ];
        for input in inputs {
            let mut lexer = Lexer::new(input);
            let mut consumed = 0;
            loop {
                let before = lexer.pos();
                let token = lexer.lex();
                if token.kind == TokenKind::Eof {
                    break;
                }
                assert!(lexer.pos() > before, "lexer must advance on {input:?}");
                consumed = lexer.pos();
            }
            assert_eq!(consumed, input.len());
        }
    }

    #[test]
    fn relexing_a_token_location_reproduces_it() {
        let src = b"(func $f (result i32) i32.const 42 (; c ;) \"str\")";
        for token in Lexer::new(src) {
            let slice = token.text(src);
            let relexed = Lexer::new(slice).lex();
            assert_eq!(relexed.kind, token.kind, "{:?}", token.loc);
        }
    }

    #[test]
    fn every_opcode_spelling_lexes_back_to_its_opcode() {
        for opcode in crate::instr::all_opcodes() {
            let text = opcode.text();
            let token = Lexer::new(text.as_bytes()).lex();
            assert_eq!(token.loc.len, text.len(), "{text}");
            match text {
                // Structural keywords shadow these opcode spellings.
                "else" | "end" | "catch" => {
                    assert!(matches!(token.kind, TokenKind::Keyword(_)), "{text}");
                }
                // Both select opcodes share a spelling; the untyped one wins.
                "select" => {
                    assert_eq!(
                        token.kind.opcode_info().unwrap().opcode,
                        Opcode::Select,
                        "{text}"
                    );
                }
                _ => {
                    let info = token.kind.opcode_info().unwrap_or_else(|| {
                        panic!("{text} lexed as {:?}", token.kind);
                    });
                    assert_eq!(info.opcode, opcode, "{text}");
                    assert_eq!(info.features, opcode.features(), "{text}");
                }
            }
        }
    }

    #[test]
    fn no_whitespace_variant_skips_trivia() {
        let mut lexer = Lexer::new(b"  ;; c\n (; b ;) module");
        let token = lexer.lex_no_whitespace();
        assert_eq!(token.kind, TokenKind::Keyword(Keyword::Module));
    }
}
