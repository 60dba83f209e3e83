//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del intérprete. Descompone una línea de
//! entrada en unidades léxicas denominadas tokens. Los espacios en
//! blanco separan tokens y se descartan, al igual que los comentarios
//! de línea (`\`) y de bloque (`( … )`).
//!
//! # Contenido de un token
//! Casi todo lo que no es espacio en blanco es una palabra: nombres,
//! números y símbolos se emiten por igual como [`Token::Word`] y es el
//! evaluador quien decide si un lexema nombra una entrada del
//! diccionario, una variable o una constante numérica. Las constantes
//! de carácter `'X'` se reducen aquí mismo a la palabra con el código
//! decimal de `X`.
//!
//! # Literales de texto
//! Existen dos formas. Una cadena cruda `"…"` expande las secuencias
//! `\n \r \t \" \\` durante el escaneo. El literal imprimible `."…"`
//! preserva su cuerpo al pie de la letra; la expansión de secuencias
//! de control ocurre hasta el momento de imprimir.
//!
//! # Errores
//! El lexer es total sobre su estado: tras reportar un error deja de
//! producir tokens, pero los tokens ya emitidos siguen siendo válidos.

use std::{iter::Peekable, str::Chars};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    /// `( …` sin su `)` de cierre.
    #[error("unterminated comment")]
    UnterminatedComment,

    /// Un `(` dentro de un comentario de bloque.
    #[error("nested comments are illegal")]
    NestedComment,

    /// Una cadena sin su `"` de cierre.
    #[error("unterminated string")]
    UnterminatedString,

    /// Una constante `'X'` cortada antes de completarse.
    #[error("unterminated single-character constant")]
    UnterminatedCharConstant,

    /// Una constante `'X'` sin la comilla de cierre en su lugar.
    #[error("syntax error")]
    CharSyntax,
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Palabra, número o símbolo; la distinción es del evaluador.
    Word(String),

    /// Cuerpo de un literal imprimible `."…"`, preservado verbatim.
    PrintString(String),

    /// Cuerpo de una cadena cruda `"…"`, con sus escapes ya expandidos.
    RawString(String),
}

/// Máquina de estados para análisis léxico.
///
/// El lexer consume la entrada carácter por carácter con un único
/// carácter de lookahead. Implementa [`Iterator`]; cada elemento es un
/// token o el error que terminó el escaneo.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pending: Option<Token>,
    failed: bool,
}

impl<'a> Lexer<'a> {
    /// Crea un lexer en estado inicial sobre una línea de entrada.
    pub fn new(input: &'a str) -> Self {
        Lexer {
            chars: input.chars().peekable(),
            pending: None,
            failed: false,
        }
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Token>, LexError> {
        let mut word = String::new();

        while let Some(&c) = self.chars.peek() {
            match c {
                // Frontera de token
                ' ' | '\t' | '\r' | '\n' => {
                    self.chars.next();
                    if !word.is_empty() {
                        return Ok(Some(Token::Word(word)));
                    }
                }

                // Comentario hasta el final de la línea
                '\\' => {
                    if !word.is_empty() {
                        return Ok(Some(Token::Word(word)));
                    }

                    for c in self.chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }

                // Comentario de bloque, sin anidamiento
                '(' => {
                    if !word.is_empty() {
                        return Ok(Some(Token::Word(word)));
                    }

                    self.chars.next();
                    self.block_comment()?;
                }

                // Constante de carácter
                '\'' => {
                    if !word.is_empty() {
                        return Ok(Some(Token::Word(word)));
                    }

                    self.chars.next();
                    return self.char_constant().map(Some);
                }

                // Cadena cruda
                '"' => {
                    if !word.is_empty() {
                        return Ok(Some(Token::Word(word)));
                    }

                    self.chars.next();
                    return self.quoted().map(|value| Some(Token::RawString(value)));
                }

                // Un punto puede abrir `."…"` o continuar una palabra
                '.' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'"') {
                        self.chars.next();
                        let token = Token::PrintString(self.verbatim()?);

                        if word.is_empty() {
                            return Ok(Some(token));
                        }

                        // La palabra acumulada sale primero
                        self.pending = Some(token);
                        return Ok(Some(Token::Word(word)));
                    }

                    word.push('.');
                }

                _ => {
                    self.chars.next();
                    word.push(c);
                }
            }
        }

        if word.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Token::Word(word)))
        }
    }

    /// Descarta un comentario `( … )` ya abierto.
    fn block_comment(&mut self) -> Result<(), LexError> {
        for c in self.chars.by_ref() {
            match c {
                ')' => return Ok(()),
                '(' => return Err(LexError::NestedComment),
                _ => (),
            }
        }

        Err(LexError::UnterminatedComment)
    }

    /// Reduce `'X'` a la palabra con el código decimal de `X`.
    fn char_constant(&mut self) -> Result<Token, LexError> {
        let c = match self.chars.next() {
            Some(c) => c,
            None => return Err(LexError::UnterminatedCharConstant),
        };

        match self.chars.next() {
            Some('\'') => Ok(Token::Word((c as u32).to_string())),
            Some(_) => Err(LexError::CharSyntax),
            None => Err(LexError::UnterminatedCharConstant),
        }
    }

    /// Lee el resto de una cadena `"…"`, expandiendo escapes.
    fn quoted(&mut self) -> Result<String, LexError> {
        let mut value = String::new();

        loop {
            match self.chars.next() {
                Some('"') => return Ok(value),

                Some('\\') => match self.chars.next() {
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    // Cualquier otro escape se reduce al carácter escapado
                    Some(c) => value.push(c),
                    None => return Err(LexError::UnterminatedString),
                },

                Some(c) => value.push(c),
                None => return Err(LexError::UnterminatedString),
            }
        }
    }

    /// Lee el resto de un literal `."…"` sin interpretar escapes.
    fn verbatim(&mut self) -> Result<String, LexError> {
        let mut value = String::new();

        loop {
            match self.chars.next() {
                Some('"') => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(LexError::UnterminatedString),
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if let Some(token) = self.pending.take() {
            return Some(Ok(token));
        }

        match self.lex() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => None,

            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Result<Vec<Token>, LexError> {
        Lexer::new(input).collect()
    }

    fn words(input: &str) -> Vec<String> {
        lex(input)
            .unwrap()
            .into_iter()
            .map(|token| match token {
                Token::Word(name) => name,
                other => panic!("expected a word, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn whitespace_separates_words() {
        assert_eq!(words("1  2\t+\n."), ["1", "2", "+", "."]);
    }

    #[test]
    fn line_comment_runs_to_end_of_line() {
        assert_eq!(words("1 \\ 2 3\n4"), ["1", "4"]);
    }

    #[test]
    fn block_comment_is_discarded() {
        assert_eq!(words("1 ( dos tres ) 4"), ["1", "4"]);
    }

    #[test]
    fn nested_block_comment_is_an_error() {
        assert_eq!(lex("( one ( two ) )"), Err(LexError::NestedComment));
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        assert_eq!(lex("( one"), Err(LexError::UnterminatedComment));
    }

    #[test]
    fn char_constant_becomes_its_code() {
        assert_eq!(words("'*'"), ["42"]);
        assert_eq!(words("'a' emit"), ["97", "emit"]);
    }

    #[test]
    fn char_constant_without_close_is_a_syntax_error() {
        assert_eq!(lex("'ab"), Err(LexError::CharSyntax));
    }

    #[test]
    fn char_constant_cut_short_is_unterminated() {
        assert_eq!(lex("'"), Err(LexError::UnterminatedCharConstant));
        assert_eq!(lex("'a"), Err(LexError::UnterminatedCharConstant));
    }

    #[test]
    fn raw_string_expands_escapes() {
        assert_eq!(
            lex(r#""a\nb\t\"c\\""#),
            Ok(vec![Token::RawString("a\nb\t\"c\\".into())])
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert_eq!(lex(r#""abc"#), Err(LexError::UnterminatedString));
    }

    #[test]
    fn print_string_preserves_body_verbatim() {
        assert_eq!(
            lex(r#"." Steve\nKemp ""#),
            Ok(vec![Token::PrintString(r" Steve\nKemp ".into())])
        );
    }

    #[test]
    fn lone_dot_is_a_word() {
        assert_eq!(words("1 ."), ["1", "."]);
        assert_eq!(words(".s"), [".s"]);
        assert_eq!(words("3.14"), ["3.14"]);
    }

    #[test]
    fn word_before_print_string_comes_first() {
        assert_eq!(
            lex(r#"x." y""#),
            Ok(vec![
                Token::Word("x".into()),
                Token::PrintString("y".into()),
            ])
        );
    }

    #[test]
    fn tokens_survive_a_later_error() {
        let mut lexer = Lexer::new("1 2 ( boom");

        assert_eq!(lexer.next(), Some(Ok(Token::Word("1".into()))));
        assert_eq!(lexer.next(), Some(Ok(Token::Word("2".into()))));
        assert_eq!(lexer.next(), Some(Err(LexError::UnterminatedComment)));
        assert_eq!(lexer.next(), None);
    }
}
