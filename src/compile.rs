//! Compilación de palabras.
//!
//! El compilador consume tokens mientras el evaluador se encuentra en
//! modo de compilación y los acumula en una palabra temporal. Hay dos
//! caminos de entrada. El explícito es `: nombre … ;`, que produce una
//! palabra con el nombre dado. El implícito ocurre cuando una
//! estructura de control aparece en el nivel superior: se compila una
//! palabra sintética anónima de nombre reservado `$ $` que se ejecuta
//! apenas la estructura cierra y queda en el diccionario, oculta de
//! los listados.
//!
//! # Estructuras de control
//! `do … loop` y `if … else … then` se resuelven por back-patching.
//! Cada `do` abierto apunta su posición en una pila propia, lo que
//! permite lazos anidados. Cada `if` abierto empuja un marco con las
//! celdas de salto por remendar; `else` remienda el salto condicional
//! y deja pendiente el incondicional, `then` remienda lo que quede y
//! cierra el marco. Una definición solo se acepta con ambas pilas
//! vacías; así todo destino de salto cae dentro del cuerpo compilado.

use std::mem;

use crate::{
    dict::Entry,
    eval::{Eval, EvalError, Mode},
    ir::Instr,
    lex::Token,
};

/// Nombre reservado de las palabras sintéticas. Contiene un espacio,
/// que ningún token puede contener, por lo cual es inalcanzable desde
/// la entrada del usuario.
pub(crate) const SYNTHETIC: &str = "$ $";

/// Destino provisional de un salto aún no remendado.
const UNPATCHED: usize = usize::MAX;

/// Marco de un `if` abierto durante la compilación.
struct IfFrame {
    /// Celda del salto condicional emitido por `if`.
    cond: usize,

    /// Celda del salto incondicional emitido por `else`, si lo hubo.
    jump: Option<usize>,
}

/// Estado temporal de la palabra en compilación.
#[derive(Default)]
pub(crate) struct Compiler {
    pub(crate) name: Option<String>,
    pub(crate) code: Vec<Instr>,
    do_open: Vec<usize>,
    if_open: Vec<IfFrame>,
}

impl Compiler {
    /// Reinicia el estado y nombra la palabra con el sentinel `$ $`.
    pub(crate) fn begin_synthetic(&mut self) {
        *self = Compiler::default();
        self.name = Some(SYNTHETIC.to_string());
    }

    /// Verifica que no queden estructuras de control abiertas.
    fn balanced(&self) -> Result<(), EvalError> {
        if !self.do_open.is_empty() {
            return Err(EvalError::Unterminated("do"));
        }

        if !self.if_open.is_empty() {
            return Err(EvalError::Unterminated("if"));
        }

        Ok(())
    }
}

impl Eval {
    /// Compila un token en la palabra temporal.
    pub(crate) fn compile_token(&mut self, token: Token) -> Result<(), EvalError> {
        match token {
            Token::Word(name) => self.compile_word(name),

            Token::PrintString(text) => {
                let index = self.intern(text);
                self.compiler.code.push(Instr::PrintString(index));
                Ok(())
            }

            Token::RawString(text) => {
                let index = self.intern(text);
                self.compiler.code.push(Instr::Push(index as f64));
                Ok(())
            }
        }
    }

    fn compile_word(&mut self, name: String) -> Result<(), EvalError> {
        // Fase de encabezado: el primer token nombra la palabra. Si el
        // nombre ya existía, la entrada anterior pasa a ser lápida.
        if self.compiler.name.is_none() {
            if let Some(existing) = self.dictionary.find(&name) {
                self.dictionary.erase(existing);
            }

            self.compiler.name = Some(name);
            return Ok(());
        }

        if name == ";" {
            return match self.mode {
                Mode::CompileNamed => {
                    self.commit()?;
                    Ok(())
                }
                _ => Err(EvalError::MisplacedSemicolon),
            };
        }

        if let Some(index) = self.dictionary.find(&name) {
            let (starts, ends) = match self.dictionary.entry(index) {
                Some(entry) => (entry.start_immediate, entry.end_immediate),
                None => (false, false),
            };

            self.compiler.code.push(Instr::Call(index));
            self.compile_structure(&name.to_ascii_lowercase())?;

            // Contabilidad del modo inmediato: la palabra sintética
            // cierra cuando todas las estructuras del nivel superior
            // han cerrado.
            if let Mode::CompileImmediate { depth } = &mut self.mode {
                if starts {
                    *depth += 1;
                }

                if ends {
                    *depth = depth.saturating_sub(1);
                    if *depth == 0 {
                        return self.finish_synthetic();
                    }
                }
            }

            return Ok(());
        }

        // Una referencia a variable compila a su índice como constante
        if let Some(index) = self.variable_index(&name) {
            self.compiler.code.push(Instr::Push(index as f64));
            return Ok(());
        }

        match name.parse::<f64>() {
            Ok(value) => {
                self.compiler.code.push(Instr::Push(value));
                Ok(())
            }
            Err(_) => Err(EvalError::NotANumber(name)),
        }
    }

    /// Emisión y back-patching de las palabras estructurales. La celda
    /// de llamada ya fue emitida; en tiempo de ejecución esa llamada es
    /// inofensiva y son las celdas agregadas aquí las que actúan.
    fn compile_structure(&mut self, word: &str) -> Result<(), EvalError> {
        let compiler = &mut self.compiler;

        match word {
            "do" => {
                compiler.do_open.push(compiler.code.len() - 1);
                compiler.code.push(Instr::NewLoop);
            }

            "loop" => {
                let open = compiler
                    .do_open
                    .pop()
                    .ok_or(EvalError::Unmatched("loop", "do"))?;

                compiler.code.push(Instr::LoopTest);
                // El cuerpo del lazo comienza justo después del NewLoop
                compiler.code.push(Instr::CondJump(open + 2));
            }

            "if" => {
                compiler.code.push(Instr::CondJump(UNPATCHED));
                compiler.if_open.push(IfFrame {
                    cond: compiler.code.len() - 1,
                    jump: None,
                });
            }

            "else" => {
                let target = compiler.code.len() + 1;
                let frame = compiler
                    .if_open
                    .last_mut()
                    .ok_or(EvalError::Unmatched("else", "if"))?;

                if frame.jump.is_some() {
                    return Err(EvalError::Unmatched("else", "if"));
                }

                compiler.code[frame.cond] = Instr::CondJump(target);
                frame.jump = Some(compiler.code.len());
                compiler.code.push(Instr::Jump(UNPATCHED));
            }

            "then" => {
                let frame = compiler
                    .if_open
                    .pop()
                    .ok_or(EvalError::Unmatched("then", "if"))?;

                // La llamada a `then` recién emitida es el destino
                let target = compiler.code.len() - 1;
                match frame.jump {
                    Some(jump) => compiler.code[jump] = Instr::Jump(target),
                    None => compiler.code[frame.cond] = Instr::CondJump(target),
                }
            }

            _ => (),
        }

        Ok(())
    }

    /// Acepta la palabra temporal y la agrega al diccionario.
    fn commit(&mut self) -> Result<usize, EvalError> {
        self.compiler.balanced()?;

        let compiler = mem::take(&mut self.compiler);
        let name = compiler.name.unwrap_or_default().to_lowercase();

        let index = self.dictionary.push(Entry::compiled(name, compiler.code));
        if self.debug {
            self.dictionary
                .disassemble(index, &self.strings, &mut self.out)?;
        }

        self.mode = Mode::Interpret;
        Ok(index)
    }

    /// Cierra la palabra sintética y la ejecuta de inmediato.
    fn finish_synthetic(&mut self) -> Result<(), EvalError> {
        let index = self.commit()?;
        self.eval_word(index)
    }
}
