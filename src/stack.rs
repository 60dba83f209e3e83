//! Pila de datos.
//!
//! Todos los operandos del lenguaje son `f64` y viven en una única
//! pila compartida. Las operaciones que extraen valores reportan
//! underflow en vez de entrar en pánico, ya que un programa del
//! usuario puede agotar la pila en cualquier momento.

use thiserror::Error;

/// Se trató de extraer un valor de una pila vacía.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stack underflow")]
pub struct Underflow;

/// Pila de operandos.
#[derive(Default, Debug, Clone)]
pub struct Stack(Vec<f64>);

impl Stack {
    /// Coloca un valor en el tope.
    pub fn push(&mut self, value: f64) {
        self.0.push(value);
    }

    /// Extrae y retorna el tope.
    pub fn pop(&mut self) -> Result<f64, Underflow> {
        self.0.pop().ok_or(Underflow)
    }

    /// Retorna el tope sin extraerlo.
    pub fn peek(&self) -> Result<f64, Underflow> {
        self.0.last().copied().ok_or(Underflow)
    }

    /// Retorna el valor en un desplazamiento dado, contando desde el fondo.
    pub fn at(&self, offset: usize) -> Option<f64> {
        self.0.get(offset).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Descarta todos los valores.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Itera del fondo hacia el tope.
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = Stack::default();
        stack.push(1.0);
        stack.push(2.0);

        assert_eq!(stack.pop(), Ok(2.0));
        assert_eq!(stack.pop(), Ok(1.0));
    }

    #[test]
    fn pop_on_empty_reports_underflow() {
        let mut stack = Stack::default();
        assert_eq!(stack.pop(), Err(Underflow));
    }

    #[test]
    fn peek_does_not_consume() {
        let mut stack = Stack::default();
        stack.push(3.5);

        assert_eq!(stack.peek(), Ok(3.5));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn at_indexes_from_the_bottom() {
        let mut stack = Stack::default();
        stack.push(1.0);
        stack.push(2.0);

        assert_eq!(stack.at(0), Some(1.0));
        assert_eq!(stack.at(1), Some(2.0));
        assert_eq!(stack.at(2), None);
    }

    #[test]
    fn clear_empties_the_stack() {
        let mut stack = Stack::default();
        stack.push(1.0);
        stack.push(2.0);
        stack.clear();

        assert!(stack.is_empty());
        assert_eq!(stack.pop(), Err(Underflow));
    }
}
