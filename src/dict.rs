//! Diccionario de palabras.
//!
//! El diccionario es una secuencia ordenada de entradas a la que solo
//! se agrega. La búsqueda por nombre es case-insensitive y retorna la
//! primera entrada viva que coincida. Redefinir un nombre no elimina
//! la entrada anterior: su nombre se borra (lápida) y la entrada
//! conserva su índice, de modo que las palabras compiladas que la
//! refieren por índice continúan funcionando.

use std::{
    io::{self, Write},
    rc::Rc,
};

use crate::{
    eval::{Eval, EvalError},
    ir::{fmt_number, Instr},
};

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Una palabra nativa recibe al evaluador completo.
pub type Native = fn(&mut Eval) -> Result<(), EvalError>;

/// Cuerpo de una entrada del diccionario.
#[derive(Clone)]
pub enum Kind {
    /// Implementada por el anfitrión.
    Native(Native),

    /// Secuencia de celdas producida por el compilador.
    Compiled(Rc<[Instr]>),
}

/// Una entrada del diccionario.
///
/// Una entrada sin nombre es una lápida: ocupa su índice pero es
/// invisible para la búsqueda y para el listado de `words`.
pub struct Entry {
    pub(crate) name: Option<NoCase<String>>,
    pub(crate) kind: Kind,
    pub(crate) start_immediate: bool,
    pub(crate) end_immediate: bool,
}

impl Entry {
    /// Entrada para una palabra nativa.
    pub fn native(name: &str, function: Native) -> Self {
        Entry {
            name: Some(NoCase::new(name.to_string())),
            kind: Kind::Native(function),
            start_immediate: false,
            end_immediate: false,
        }
    }

    /// Entrada para una palabra compilada.
    pub fn compiled(name: String, code: Vec<Instr>) -> Self {
        Entry {
            name: Some(NoCase::new(name)),
            kind: Kind::Compiled(Rc::from(code)),
            start_immediate: false,
            end_immediate: false,
        }
    }

    /// Marca que esta palabra abre una estructura de control y por
    /// tanto dispara la compilación inmediata en el nivel superior.
    pub fn immediate_start(mut self) -> Self {
        self.start_immediate = true;
        self
    }

    /// Marca que esta palabra cierra una estructura de control.
    pub fn immediate_end(mut self) -> Self {
        self.end_immediate = true;
        self
    }
}

/// Colección ordenada de entradas.
#[derive(Default)]
pub struct Dictionary {
    entries: Vec<Entry>,
}

impl Dictionary {
    /// Agrega una entrada y retorna su índice.
    pub fn push(&mut self, entry: Entry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Busca la primera entrada viva con el nombre dado.
    pub fn find(&self, name: &str) -> Option<usize> {
        let wanted = NoCase::new(name);

        self.entries.iter().position(|entry| {
            entry
                .name
                .as_ref()
                .map_or(false, |known| NoCase::new(known.as_ref()) == wanted)
        })
    }

    /// Obtiene una entrada por índice.
    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Obtiene el cuerpo de una entrada por índice.
    pub fn kind(&self, index: usize) -> Option<Kind> {
        self.entries.get(index).map(|entry| entry.kind.clone())
    }

    /// Obtiene el nombre de una entrada viva por índice.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.entries.get(index)?.name.as_ref().map(AsRef::as_ref)
    }

    /// Convierte una entrada en lápida.
    pub fn erase(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.name = None;
        }
    }

    /// Itera sobre los nombres visibles para el usuario. Las lápidas y
    /// los nombres con espacios (las palabras sintéticas `$ $`) se
    /// omiten.
    pub fn visible(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter_map(|entry| entry.name.as_ref().map(AsRef::as_ref))
            .filter(|name: &&str| !name.contains(' '))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Presenta el desensamblado de una entrada.
    pub fn disassemble(
        &self,
        index: usize,
        strings: &[String],
        out: &mut dyn Write,
    ) -> io::Result<()> {
        let entry = match self.entries.get(index) {
            Some(entry) => entry,
            None => return Ok(()),
        };

        let name = entry.name.as_ref().map_or("", AsRef::as_ref);
        writeln!(out, "Word '{}'", name)?;

        if let Kind::Compiled(code) = &entry.kind {
            for (ip, instr) in code.iter().enumerate() {
                match *instr {
                    Instr::Call(target) => {
                        writeln!(out, " {}: {}", ip, self.name(target).unwrap_or("?"))?;
                    }
                    Instr::Push(value) => {
                        writeln!(out, " {}: store {}", ip, fmt_number(value))?;
                    }
                    Instr::CondJump(target) => writeln!(out, " {}: [cond-jmp {}]", ip, target)?,
                    Instr::Jump(target) => writeln!(out, " {}: [jmp {}]", ip, target)?,
                    Instr::PrintString(string) => {
                        let text = strings.get(string).map_or("", String::as_str);
                        writeln!(out, " {}: [print-string {} (\"{}\")]", ip, string, text)?;
                    }
                    Instr::NewLoop => writeln!(out, " {}: [new-loop]", ip)?,
                    Instr::LoopTest => writeln!(out, " {}: [loop-test]", ip)?,
                }
            }
        }

        Ok(())
    }
}
