//! Evaluación.
//!
//! El evaluador es el dueño de todo el estado del intérprete: pila de
//! datos, diccionario, variables, pool de literales, pila de lazos y
//! el borrador del compilador. Es estrictamente secuencial; `eval`
//! corre hasta completarse y el anfitrión no debe compartir un mismo
//! evaluador entre hilos.
//!
//! # Despacho por token
//! Cada token de la entrada sigue uno de tres caminos. En modo
//! interpretación, una palabra conocida se ejecuta de inmediato, una
//! referencia a variable empuja su índice y cualquier otro lexema se
//! interpreta como número. En modo compilación el token se acumula en
//! la palabra temporal. El tercer camino es implícito: una palabra que
//! abre estructura de control en el nivel superior conmuta al modo
//! inmediato, que compila una palabra sintética y la ejecuta al
//! cerrar la estructura.
//!
//! # Recuperación de errores
//! Cualquier error aborta `eval` de inmediato. El anfitrión llama
//! `reset`, que descarta la pila, el borrador de compilación y los
//! lazos abiertos; el diccionario y las variables sobreviven.

use std::{
    env,
    io::{self, Write},
};

use log::debug;
use thiserror::Error;

use crate::{
    builtins,
    compile::Compiler,
    dict::{Dictionary, Kind, Native, NoCase},
    ir::Instr,
    lex::{LexError, Lexer, Token},
    stack::{Stack, Underflow},
};

/// Error de evaluación.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Underflow(#[from] Underflow),

    #[error(transparent)]
    Lex(#[from] LexError),

    /// El lexema no nombra palabra ni variable y no es un número.
    #[error("failed to convert {0} to number")]
    NotANumber(String),

    /// Acceso a los índices de lazo fuera de todo lazo.
    #[error("cannot access '{0}' outside a loop-body")]
    OutsideLoop(&'static str),

    /// Palabra de cierre sin su palabra de apertura.
    #[error("'{0}' without a matching '{1}'")]
    Unmatched(&'static str, &'static str),

    /// La definición terminó con una estructura de control abierta.
    #[error("unterminated '{0}'")]
    Unterminated(&'static str),

    #[error("';' without a matching ':'")]
    MisplacedSemicolon,

    /// `variable` no fue seguida por un nombre.
    #[error("expected a variable name")]
    ExpectedVariableName,

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown variable {0}")]
    UnknownVariable(String),

    #[error("invalid word index {0}")]
    BadWordIndex(usize),

    #[error("invalid string index {0}")]
    BadStringIndex(usize),

    #[error("invalid variable index {0}")]
    BadVariableIndex(i64),

    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// Modo de consumo de tokens.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Ejecutar cada token apenas se conoce.
    Interpret,

    /// Acumular tokens en una definición `: … ;`.
    CompileNamed,

    /// Acumular tokens en una palabra sintética; `depth` cuenta las
    /// estructuras de control del nivel superior aún abiertas.
    CompileImmediate { depth: u32 },
}

/// Una celda de variable con nombre.
pub(crate) struct Variable {
    pub(crate) name: NoCase<String>,
    pub(crate) value: f64,
}

/// Marco de un lazo `do … loop` activo.
pub(crate) struct LoopFrame {
    /// Valor inicial del contador.
    pub(crate) start: i64,
    pub(crate) max: i64,
    pub(crate) current: i64,
}

/// El evaluador.
pub struct Eval {
    pub(crate) stack: Stack,
    pub(crate) dictionary: Dictionary,
    pub(crate) variables: Vec<Variable>,
    pub(crate) strings: Vec<String>,
    pub(crate) loops: Vec<LoopFrame>,
    pub(crate) compiler: Compiler,
    pub(crate) mode: Mode,
    pub(crate) defining_variable: bool,
    pub(crate) debug: bool,
    pub(crate) out: Box<dyn Write>,
}

impl Eval {
    /// Crea un evaluador con todas las palabras nativas registradas.
    ///
    /// La variable de ambiente `DEBUG`, con cualquier valor no vacío,
    /// activa el rastreo interno desde la construcción.
    pub fn new() -> Self {
        let mut dictionary = Dictionary::default();
        builtins::install(&mut dictionary);

        Eval {
            stack: Stack::default(),
            dictionary,
            variables: Vec::new(),
            strings: Vec::new(),
            loops: Vec::new(),
            compiler: Compiler::default(),
            mode: Mode::Interpret,
            defining_variable: false,
            debug: env::var_os("DEBUG").map_or(false, |value| !value.is_empty()),
            out: Box::new(io::stdout()),
        }
    }

    /// Analiza y ejecuta una entrada completa.
    pub fn eval(&mut self, input: &str) -> Result<(), EvalError> {
        for token in Lexer::new(input) {
            self.eval_token(token?)?;
        }

        Ok(())
    }

    /// Regresa el evaluador a un estado conocido tras un error.
    ///
    /// La pila de datos, los lazos y el borrador de compilación se
    /// descartan; el diccionario, las variables y el pool de literales
    /// se preservan. La operación es idempotente.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.loops.clear();
        self.compiler = Compiler::default();
        self.mode = Mode::Interpret;
        self.defining_variable = false;
    }

    /// Lee una variable por nombre.
    pub fn get_variable(&self, name: &str) -> Result<f64, EvalError> {
        self.variable_index(name)
            .map(|index| self.variables[index].value)
            .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))
    }

    /// Escribe una variable por nombre, creando la celda si no existe.
    pub fn set_variable(&mut self, name: &str, value: f64) {
        let index = self.define_variable(name);
        self.variables[index].value = value;
    }

    /// Redirige toda la salida impresa.
    pub fn set_writer(&mut self, writer: Box<dyn Write>) {
        self.out = writer;
    }

    /// Registra una palabra nativa del anfitrión. Si el nombre ya
    /// existía, la entrada anterior pasa a ser lápida.
    pub fn register(&mut self, name: &str, function: Native) {
        if let Some(existing) = self.dictionary.find(name) {
            self.dictionary.erase(existing);
        }

        self.dictionary.push(crate::dict::Entry::native(name, function));
    }

    /// Acceso de lectura a la pila de datos.
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Despacha un solo token según el modo actual.
    fn eval_token(&mut self, token: Token) -> Result<(), EvalError> {
        // `variable` reclama el siguiente token como nombre
        if self.defining_variable {
            self.defining_variable = false;

            return match token {
                Token::Word(name) => {
                    self.define_variable(&name);
                    Ok(())
                }
                _ => Err(EvalError::ExpectedVariableName),
            };
        }

        match self.mode {
            Mode::Interpret => self.interpret(token),
            Mode::CompileNamed | Mode::CompileImmediate { .. } => self.compile_token(token),
        }
    }

    fn interpret(&mut self, token: Token) -> Result<(), EvalError> {
        match token {
            Token::Word(name) => {
                if let Some(index) = self.dictionary.find(&name) {
                    let starts = self
                        .dictionary
                        .entry(index)
                        .map_or(false, |entry| entry.start_immediate);

                    // Una estructura de control en el nivel superior
                    // conmuta al modo inmediato; el propio token abre
                    // la cuenta de estructuras pendientes.
                    if starts {
                        self.compiler.begin_synthetic();
                        self.mode = Mode::CompileImmediate { depth: 0 };
                        return self.compile_token(Token::Word(name));
                    }

                    return self.eval_word(index);
                }

                if let Some(index) = self.variable_index(&name) {
                    self.stack.push(index as f64);
                    return Ok(());
                }

                match name.parse::<f64>() {
                    Ok(value) => {
                        self.stack.push(value);
                        Ok(())
                    }
                    Err(_) => Err(EvalError::NotANumber(name)),
                }
            }

            Token::PrintString(text) => self.print_text(&text),

            Token::RawString(text) => {
                let index = self.intern(text);
                self.stack.push(index as f64);
                Ok(())
            }
        }
    }

    /// Ejecuta la entrada del diccionario en el índice dado.
    pub(crate) fn eval_word(&mut self, index: usize) -> Result<(), EvalError> {
        let kind = self
            .dictionary
            .kind(index)
            .ok_or(EvalError::BadWordIndex(index))?;

        if self.debug {
            debug!("calling {}", self.dictionary.name(index).unwrap_or("?"));
        }

        match kind {
            Kind::Native(function) => function(self),
            Kind::Compiled(code) => self.run(&code),
        }
    }

    /// Recorre el cuerpo de una palabra compilada.
    fn run(&mut self, code: &[Instr]) -> Result<(), EvalError> {
        let mut ip = 0;

        while let Some(instr) = code.get(ip) {
            match *instr {
                Instr::Push(value) => self.stack.push(value),

                Instr::Call(index) => self.eval_word(index)?,

                Instr::Jump(target) => {
                    ip = target;
                    continue;
                }

                Instr::CondJump(target) => {
                    if self.stack.pop()? == 0.0 {
                        ip = target;
                        continue;
                    }
                }

                Instr::PrintString(index) => {
                    let text = self
                        .strings
                        .get(index)
                        .ok_or(EvalError::BadStringIndex(index))?
                        .clone();

                    self.print_text(&text)?;
                }

                Instr::NewLoop => {
                    let current = self.stack.pop()? as i64;
                    let max = self.stack.pop()? as i64;

                    self.loops.push(LoopFrame {
                        start: current,
                        max,
                        current,
                    });
                }

                Instr::LoopTest => {
                    let debug = self.debug;
                    let frame = self
                        .loops
                        .last_mut()
                        .ok_or(EvalError::OutsideLoop("loop"))?;

                    frame.current += 1;
                    if debug {
                        debug!(
                            "loop {}..{} reached {}",
                            frame.start, frame.max, frame.current
                        );
                    }

                    if frame.current >= frame.max {
                        self.loops.pop();
                        self.stack.push(1.0);
                    } else {
                        self.stack.push(0.0);
                    }
                }
            }

            ip += 1;
        }

        Ok(())
    }

    /// Imprime el cuerpo de un literal `."…"`: se recorta el espacio
    /// circundante y se expanden las secuencias de control.
    pub(crate) fn print_text(&mut self, text: &str) -> Result<(), EvalError> {
        let text = text
            .trim()
            .replace("\\n", "\n")
            .replace("\\r", "\r")
            .replace("\\t", "\t");

        write!(self.out, "{}", text)?;
        self.out.flush()?;
        Ok(())
    }

    /// Agrega un literal al pool y retorna su índice.
    pub(crate) fn intern(&mut self, text: String) -> usize {
        self.strings.push(text);
        self.strings.len() - 1
    }

    /// Busca una variable por nombre, sin distinguir mayúsculas.
    pub(crate) fn variable_index(&self, name: &str) -> Option<usize> {
        let wanted = NoCase::new(name);

        self.variables
            .iter()
            .position(|variable| NoCase::new(variable.name.as_ref()) == wanted)
    }

    /// Crea una variable si no existe y retorna su índice.
    pub(crate) fn define_variable(&mut self, name: &str) -> usize {
        match self.variable_index(name) {
            Some(index) => index,
            None => {
                self.variables.push(Variable {
                    name: NoCase::new(name.to_string()),
                    value: 0.0,
                });

                self.variables.len() - 1
            }
        }
    }

    /// Celda de variable direccionada por un índice tomado de la pila.
    pub(crate) fn variable_at(&mut self, raw: f64) -> Result<&mut Variable, EvalError> {
        let index = raw as i64;
        if index < 0 || index as usize >= self.variables.len() {
            return Err(EvalError::BadVariableIndex(index));
        }

        Ok(&mut self.variables[index as usize])
    }
}

impl Default for Eval {
    fn default() -> Self {
        Eval::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    /// Escritor compartido para capturar la salida en las pruebas.
    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    fn evaluator() -> (Eval, Capture) {
        let mut forth = Eval::new();
        forth.set_debug(false);

        let capture = Capture::default();
        forth.set_writer(Box::new(capture.clone()));
        (forth, capture)
    }

    fn output(source: &str) -> String {
        let (mut forth, capture) = evaluator();
        forth.eval(source).unwrap();
        capture.text()
    }

    #[test]
    fn addition_prints_the_sum() {
        assert_eq!(output("1 2 + ."), "3\n");
    }

    #[test]
    fn division_prints_a_trimmed_float() {
        assert_eq!(output("5 4 / ."), "1.25\n");
    }

    #[test]
    fn counted_loop_runs_inside_a_definition() {
        let source = ": star 42 emit ; : stars 0 do star loop 10 emit ; 3 stars";
        let (mut forth, capture) = evaluator();

        forth.eval(source).unwrap();
        assert_eq!(capture.text(), "***\n");
        assert!(forth.stack().is_empty());
    }

    #[test]
    fn if_takes_the_true_branch() {
        assert_eq!(output("3 3 = if 1 else 2 then ."), "1\n");
    }

    #[test]
    fn if_takes_the_false_branch() {
        assert_eq!(output("3 31 = if 1 else 12 then ."), "12\n");
    }

    #[test]
    fn variables_persist_across_calls() {
        let (mut forth, _) = evaluator();
        forth
            .eval("variable meow 3 meow ! : double meow @ 2 * meow ! ; double double")
            .unwrap();

        assert_eq!(forth.get_variable("meow").unwrap(), 12.0);
    }

    #[test]
    fn print_string_trims_and_expands_escapes() {
        assert_eq!(output(r#"." Steve\nKemp ""#), "Steve\nKemp");
    }

    #[test]
    fn print_string_runs_from_a_compiled_word() {
        let (mut forth, capture) = evaluator();
        forth
            .eval(r#": greet ." hola mundo\n" ; greet greet"#)
            .unwrap();

        assert_eq!(capture.text(), "hola mundo\nhola mundo\n");
    }

    #[test]
    fn loop_indices_are_visible_in_the_body() {
        let source = "10 0 do i 48 + emit 47 emit m . loop";
        let expected = "0/10\n1/10\n2/10\n3/10\n4/10\n5/10\n6/10\n7/10\n8/10\n9/10\n";
        assert_eq!(output(source), expected);
    }

    #[test]
    fn nested_loops_multiply() {
        assert_eq!(output("2 0 do 3 0 do 42 emit loop loop"), "******");
    }

    #[test]
    fn top_level_if_without_else() {
        assert_eq!(output("1 if 42 emit then"), "*");
        assert_eq!(output("0 if 42 emit then"), "");
    }

    #[test]
    fn nested_if_inside_a_definition() {
        let source = ": grade dup 10 >= if drop 42 emit else 5 >= if 43 emit else 45 emit then then ;";
        let (mut forth, capture) = evaluator();
        forth.eval(source).unwrap();

        forth.eval("12 grade 7 grade 1 grade").unwrap();
        assert_eq!(capture.text(), "*+-");
    }

    #[test]
    fn pop_on_empty_stack_fails_and_reset_recovers() {
        let (mut forth, _) = evaluator();
        let error = forth.eval(".").unwrap_err();
        assert!(matches!(error, EvalError::Underflow(_)));
        assert_eq!(error.to_string(), "stack underflow");

        forth.reset();
        forth.eval("1 2 +").unwrap();
        assert_eq!(forth.stack().peek(), Ok(3.0));
    }

    #[test]
    fn loop_index_outside_a_loop_fails() {
        let (mut forth, _) = evaluator();
        forth.eval(": foo i ;").unwrap();

        let error = forth.eval("foo").unwrap_err();
        assert_eq!(
            error.to_string(),
            "cannot access 'i' outside a loop-body"
        );
    }

    #[test]
    fn malformed_numbers_report_the_lexeme() {
        let (mut forth, _) = evaluator();
        let error = forth.eval("3.2.1.2").unwrap_err();
        assert_eq!(error.to_string(), "failed to convert 3.2.1.2 to number");
    }

    #[test]
    fn lex_errors_surface_through_eval() {
        let (mut forth, _) = evaluator();
        let error = forth.eval("( one ( two ) )").unwrap_err();
        assert_eq!(error.to_string(), "nested comments are illegal");
    }

    #[test]
    fn redefinition_keeps_old_callers_working() {
        let (mut forth, capture) = evaluator();
        forth.eval(": foo 1 ; : bar foo . ; : foo 2 ;").unwrap();

        forth.eval("bar").unwrap();
        forth.eval("foo .").unwrap();
        assert_eq!(capture.text(), "1\n2\n");
    }

    #[test]
    fn lookup_is_case_insensitive_at_evaluation() {
        assert_eq!(output("3 DUP + ."), "6\n");
    }

    #[test]
    fn reset_is_idempotent() {
        let (mut forth, _) = evaluator();
        forth.eval("1 2 3").unwrap();
        // Deja una definición a medio compilar
        forth.eval(": partial 1 0 do").unwrap();

        forth.reset();
        let words = forth.dictionary.len();
        let variables = forth.variables.len();

        forth.reset();
        assert!(forth.stack().is_empty());
        assert_eq!(forth.mode, Mode::Interpret);
        assert_eq!(forth.dictionary.len(), words);
        assert_eq!(forth.variables.len(), variables);
    }

    #[test]
    fn dup_drop_leaves_the_value() {
        let (mut forth, _) = evaluator();
        forth.eval("7 dup drop").unwrap();

        assert_eq!(forth.stack().len(), 1);
        assert_eq!(forth.stack().peek(), Ok(7.0));
    }

    #[test]
    fn double_swap_is_identity() {
        let (mut forth, _) = evaluator();
        forth.eval("1 2 swap swap").unwrap();

        assert_eq!(forth.stack().at(0), Some(1.0));
        assert_eq!(forth.stack().at(1), Some(2.0));
    }

    #[test]
    fn double_invert_normalizes_truthiness() {
        assert_eq!(output("5 invert invert ."), "1\n");
        assert_eq!(output("0 invert invert ."), "0\n");
    }

    #[test]
    fn synthetic_words_stay_hidden() {
        let (mut forth, _) = evaluator();
        let before = forth.dictionary.visible().count();

        forth.eval("1 if 2 then").unwrap();
        assert_eq!(forth.dictionary.visible().count(), before);
    }

    #[test]
    fn raw_strings_push_their_pool_index() {
        let (mut forth, _) = evaluator();
        forth.eval(r#""hola" "mundo""#).unwrap();

        assert_eq!(forth.stack().at(0), Some(0.0));
        assert_eq!(forth.stack().at(1), Some(1.0));
        assert_eq!(forth.strings, ["hola", "mundo"]);
    }

    #[test]
    fn set_variable_creates_the_cell() {
        let (mut forth, capture) = evaluator();
        forth.set_variable("speed", 88.0);

        assert_eq!(forth.get_variable("speed").unwrap(), 88.0);
        forth.eval("speed @ .").unwrap();
        assert_eq!(capture.text(), "88\n");
    }

    #[test]
    fn unknown_variables_are_reported() {
        let (forth, _) = evaluator();
        assert!(matches!(
            forth.get_variable("missing"),
            Err(EvalError::UnknownVariable(_))
        ));
    }

    #[test]
    fn registered_native_words_are_callable() {
        fn double_top(forth: &mut Eval) -> Result<(), EvalError> {
            let value = forth.stack.pop()?;
            forth.stack.push(value * 2.0);
            Ok(())
        }

        let (mut forth, capture) = evaluator();
        forth.register("2*", double_top);

        forth.eval("21 2* .").unwrap();
        assert_eq!(capture.text(), "42\n");
    }
}
