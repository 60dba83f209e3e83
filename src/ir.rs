//! Representación intermedia de palabras compiladas.
//!
//! La representación es lineal: el cuerpo de una palabra compilada es
//! una secuencia plana de celdas de instrucción que el evaluador
//! recorre con un puntero de instrucción medido en celdas. No hay
//! etiquetas; el control de flujo se expresa con saltos a índices
//! absolutos dentro del mismo cuerpo, resueltos por back-patching
//! durante la compilación.
//!
//! # Llamadas
//! Una celda [`Instr::Call`] refiere a una entrada del diccionario por
//! índice. Los índices son estables: redefinir una palabra marca la
//! entrada vieja como lápida pero nunca la elimina, por lo cual el
//! código compilado antes de la redefinición sigue siendo válido.
//!
//! # Lazos
//! Un `do … loop` se compila al triplete [`Instr::NewLoop`],
//! [`Instr::LoopTest`] y un [`Instr::CondJump`] cuyo destino es la
//! primera celda del cuerpo del lazo. `NewLoop` extrae los límites de
//! la pila de datos y abre un marco de lazo; `LoopTest` incrementa el
//! contador y deja sobre la pila la condición que el salto consume.

/// Una celda de instrucción.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Instr {
    /// Invocar la entrada del diccionario en el índice dado.
    Call(usize),

    /// Colocar una constante sobre la pila de datos.
    Push(f64),

    /// Saltar al índice dado si y solo si el tope de la pila es cero.
    /// El tope se consume en ambos casos.
    CondJump(usize),

    /// Saltar incondicionalmente al índice dado.
    Jump(usize),

    /// Imprimir la cadena del pool de literales en el índice dado.
    PrintString(usize),

    /// Abrir un marco de lazo con (max, actual) tomados de la pila.
    NewLoop,

    /// Avanzar el lazo más interno; deja 1 si el lazo terminó, 0 si no.
    LoopTest,
}

/// Presenta un valor como lo hace la palabra `.`: los enteros sin
/// punto decimal y el resto con seis decimales menos los ceros al
/// final.
pub(crate) fn fmt_number(value: f64) -> String {
    if value.is_finite() && value == value.trunc() {
        return format!("{}", value as i64);
    }

    let mut text = format!("{:.6}", value);
    while text.ends_with('0') {
        text.pop();
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_print_without_decimals() {
        assert_eq!(fmt_number(3.0), "3");
        assert_eq!(fmt_number(-17.0), "-17");
        assert_eq!(fmt_number(0.0), "0");
    }

    #[test]
    fn fractions_lose_trailing_zeros() {
        assert_eq!(fmt_number(1.25), "1.25");
        assert_eq!(fmt_number(0.5), "0.5");
        assert_eq!(fmt_number(-2.375), "-2.375");
    }
}
