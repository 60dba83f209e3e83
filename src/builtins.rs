//! Palabras nativas.
//!
//! Implementa el vocabulario inicial del diccionario: aritmética,
//! comparación, manipulación de pila, E/S, acceso a variables y a los
//! índices de lazo, e introspección. Las palabras estructurales
//! (`do`, `loop`, `if`, `else`, `then`) también viven aquí pero como
//! no-ops: sus llamadas quedan intercaladas en el código compilado y
//! son las celdas especiales emitidas por el compilador las que
//! actúan en tiempo de ejecución.

use std::io::Write;

use crate::{
    compile::Compiler,
    dict::{Dictionary, Entry},
    eval::{Eval, EvalError, Mode},
    ir::fmt_number,
};

/// Puebla un diccionario con el vocabulario inicial.
pub(crate) fn install(dictionary: &mut Dictionary) {
    dictionary.push(Entry::native("!", store));
    dictionary.push(Entry::native("#words", word_count));
    dictionary.push(Entry::native("*", mul));
    dictionary.push(Entry::native("+", add));
    dictionary.push(Entry::native("-", sub));
    dictionary.push(Entry::native(".", print_top));
    dictionary.push(Entry::native(".s", show_stack));
    dictionary.push(Entry::native("/", div));
    dictionary.push(Entry::native(":", start_definition));
    dictionary.push(Entry::native(";", nop));
    dictionary.push(Entry::native("<", less));
    dictionary.push(Entry::native("<=", less_eq));
    dictionary.push(Entry::native("=", equal));
    dictionary.push(Entry::native("==", equal));
    dictionary.push(Entry::native(">", greater));
    dictionary.push(Entry::native(">=", greater_eq));
    dictionary.push(Entry::native("@", fetch));
    dictionary.push(Entry::native("clearstack", clear_stack));
    dictionary.push(Entry::native("debug", debug_set));
    dictionary.push(Entry::native("debug?", debug_flag));
    dictionary.push(Entry::native("do", nop).immediate_start());
    dictionary.push(Entry::native("drop", drop_top));
    dictionary.push(Entry::native("dump", dump));
    dictionary.push(Entry::native("dup", dup));
    dictionary.push(Entry::native("else", nop));
    dictionary.push(Entry::native("emit", emit));
    dictionary.push(Entry::native("i", loop_index));
    dictionary.push(Entry::native("if", nop).immediate_start());
    dictionary.push(Entry::native("invert", invert));
    dictionary.push(Entry::native("loop", nop).immediate_end());
    dictionary.push(Entry::native("m", loop_max));
    dictionary.push(Entry::native("max", max));
    dictionary.push(Entry::native("min", min));
    dictionary.push(Entry::native("mod", modulo));
    dictionary.push(Entry::native("nop", nop));
    dictionary.push(Entry::native("over", over));
    dictionary.push(Entry::native("print", print_top));
    dictionary.push(Entry::native("swap", swap));
    dictionary.push(Entry::native("then", nop).immediate_end());
    dictionary.push(Entry::native("variable", variable));
    dictionary.push(Entry::native("words", words));
}

/// Extrae `a` (tope) y luego `b`, y empuja `op(a, b)`.
fn bin_op(forth: &mut Eval, op: impl FnOnce(f64, f64) -> f64) -> Result<(), EvalError> {
    let a = forth.stack.pop()?;
    let b = forth.stack.pop()?;

    forth.stack.push(op(a, b));
    Ok(())
}

fn add(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| b + a)
}

fn sub(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| b - a)
}

fn mul(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| b * a)
}

fn div(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| b / a)
}

fn modulo(forth: &mut Eval) -> Result<(), EvalError> {
    let a = forth.stack.pop()? as i64;
    let b = forth.stack.pop()? as i64;

    if a == 0 {
        return Err(EvalError::DivisionByZero);
    }

    forth.stack.push((b % a) as f64);
    Ok(())
}

fn min(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| b.min(a))
}

fn max(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| b.max(a))
}

fn equal(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| if b == a { 1.0 } else { 0.0 })
}

fn less(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| if b < a { 1.0 } else { 0.0 })
}

fn less_eq(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| if b <= a { 1.0 } else { 0.0 })
}

fn greater(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| if b > a { 1.0 } else { 0.0 })
}

fn greater_eq(forth: &mut Eval) -> Result<(), EvalError> {
    bin_op(forth, |a, b| if b >= a { 1.0 } else { 0.0 })
}

/// Lógica binaria: cero se vuelve uno y todo lo demás cero.
fn invert(forth: &mut Eval) -> Result<(), EvalError> {
    let value = forth.stack.pop()?;
    forth.stack.push(if value == 0.0 { 1.0 } else { 0.0 });
    Ok(())
}

fn dup(forth: &mut Eval) -> Result<(), EvalError> {
    let value = forth.stack.pop()?;
    forth.stack.push(value);
    forth.stack.push(value);
    Ok(())
}

fn drop_top(forth: &mut Eval) -> Result<(), EvalError> {
    forth.stack.pop()?;
    Ok(())
}

fn swap(forth: &mut Eval) -> Result<(), EvalError> {
    let a = forth.stack.pop()?;
    let b = forth.stack.pop()?;

    forth.stack.push(a);
    forth.stack.push(b);
    Ok(())
}

/// ( b a — b a b )
fn over(forth: &mut Eval) -> Result<(), EvalError> {
    let a = forth.stack.pop()?;
    let b = forth.stack.pop()?;

    forth.stack.push(b);
    forth.stack.push(a);
    forth.stack.push(b);
    Ok(())
}

fn print_top(forth: &mut Eval) -> Result<(), EvalError> {
    let value = forth.stack.pop()?;

    writeln!(forth.out, "{}", fmt_number(value))?;
    forth.out.flush()?;
    Ok(())
}

/// Emite el tope como carácter Unicode.
fn emit(forth: &mut Eval) -> Result<(), EvalError> {
    let value = forth.stack.pop()?;
    let c = char::from_u32(value as u32).unwrap_or(char::REPLACEMENT_CHARACTER);

    write!(forth.out, "{}", c)?;
    forth.out.flush()?;
    Ok(())
}

/// Presenta el largo y el contenido de la pila sin modificarla.
fn show_stack(forth: &mut Eval) -> Result<(), EvalError> {
    let rendered: Vec<String> = forth.stack.iter().map(|value| fmt_number(*value)).collect();

    if rendered.is_empty() {
        writeln!(forth.out, "<0>")?;
    } else {
        writeln!(forth.out, "<{}> {}", rendered.len(), rendered.join(" "))?;
    }

    forth.out.flush()?;
    Ok(())
}

fn clear_stack(forth: &mut Eval) -> Result<(), EvalError> {
    forth.stack.clear();
    Ok(())
}

/// Índice actual del lazo más interno.
fn loop_index(forth: &mut Eval) -> Result<(), EvalError> {
    let frame = forth.loops.last().ok_or(EvalError::OutsideLoop("i"))?;
    forth.stack.push(frame.current as f64);
    Ok(())
}

/// Límite del lazo más interno.
fn loop_max(forth: &mut Eval) -> Result<(), EvalError> {
    let frame = forth.loops.last().ok_or(EvalError::OutsideLoop("m"))?;
    forth.stack.push(frame.max as f64);
    Ok(())
}

/// ( valor índice — ) escribe una celda de variable.
fn store(forth: &mut Eval) -> Result<(), EvalError> {
    let index = forth.stack.pop()?;
    let value = forth.stack.pop()?;

    forth.variable_at(index)?.value = value;
    Ok(())
}

/// ( índice — valor ) lee una celda de variable.
fn fetch(forth: &mut Eval) -> Result<(), EvalError> {
    let index = forth.stack.pop()?;
    let value = forth.variable_at(index)?.value;

    forth.stack.push(value);
    Ok(())
}

/// Reclama el siguiente token de la entrada como nombre de variable.
fn variable(forth: &mut Eval) -> Result<(), EvalError> {
    forth.defining_variable = true;
    Ok(())
}

/// Entra en modo de compilación; el intérprete cierra la definición
/// cuando encuentra `;`.
fn start_definition(forth: &mut Eval) -> Result<(), EvalError> {
    forth.compiler = Compiler::default();
    forth.mode = Mode::CompileNamed;
    Ok(())
}

fn debug_set(forth: &mut Eval) -> Result<(), EvalError> {
    let value = forth.stack.pop()?;
    forth.debug = value != 0.0;
    Ok(())
}

fn debug_flag(forth: &mut Eval) -> Result<(), EvalError> {
    forth.stack.push(if forth.debug { 1.0 } else { 0.0 });
    Ok(())
}

/// Lista los nombres visibles en orden lexicográfico.
fn words(forth: &mut Eval) -> Result<(), EvalError> {
    let mut known: Vec<&str> = forth.dictionary.visible().collect();
    known.sort_unstable();

    writeln!(forth.out, "{}", known.join(" "))?;
    forth.out.flush()?;
    Ok(())
}

/// Empuja la cantidad de nombres visibles.
fn word_count(forth: &mut Eval) -> Result<(), EvalError> {
    let count = forth.dictionary.visible().count();
    forth.stack.push(count as f64);
    Ok(())
}

/// ( índice — ) presenta el desensamblado de una entrada.
fn dump(forth: &mut Eval) -> Result<(), EvalError> {
    let raw = forth.stack.pop()?;
    let index = raw as usize;

    if raw < 0.0 || forth.dictionary.entry(index).is_none() {
        return Err(EvalError::BadWordIndex(index));
    }

    forth.dictionary.disassemble(index, &forth.strings, &mut forth.out)?;
    forth.out.flush()?;
    Ok(())
}

fn nop(_: &mut Eval) -> Result<(), EvalError> {
    Ok(())
}
