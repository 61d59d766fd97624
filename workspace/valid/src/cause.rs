/// A single validation failure together with the trace of places it was
/// reported from, outermost first.
#[derive(Clone, PartialEq, Debug)]
pub struct Cause<E> {
    pub message: E,
    pub trace: Vec<String>,
}

impl<E> Cause<E> {
    pub fn new(message: E) -> Self {
        Cause { message, trace: Vec::new() }
    }

    pub fn transform<E1>(self, f: &impl Fn(E) -> E1) -> Cause<E1> {
        Cause { message: f(self.message), trace: self.trace }
    }
}
