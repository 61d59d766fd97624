use crate::{Valid, Validator};

/// A validating rewrite of a value into a value of the same type.
/// Transforms compose left to right with [`Transform::pipe`].
pub trait Transform {
    type Value;
    type Error;

    fn transform(&self, input: Self::Value) -> Valid<Self::Value, Self::Error>;

    fn pipe<Other>(self, other: Other) -> Pipe<Self, Other>
    where
        Self: Sized,
    {
        Pipe(self, other)
    }

    fn map_err<F, E>(self, f: F) -> MapError<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Error) -> E,
    {
        MapError(self, f)
    }
}

pub struct Pipe<A, B>(A, B);

impl<A: Transform, B> Transform for Pipe<A, B>
where
    B: Transform<Value = A::Value, Error = A::Error>,
{
    type Value = A::Value;
    type Error = A::Error;

    fn transform(&self, input: Self::Value) -> Valid<Self::Value, Self::Error> {
        self.0
            .transform(input)
            .and_then(|input| self.1.transform(input))
    }
}

pub struct Identity<V, E>(std::marker::PhantomData<(V, E)>);

impl<V, E> Default for Identity<V, E> {
    fn default() -> Self {
        Identity(std::marker::PhantomData)
    }
}

impl<V, E> Transform for Identity<V, E> {
    type Value = V;
    type Error = E;

    fn transform(&self, input: Self::Value) -> Valid<Self::Value, Self::Error> {
        Valid::succeed(input)
    }
}

pub struct MapError<A, F>(A, F);

impl<A: Transform, F, E> Transform for MapError<A, F>
where
    F: Fn(A::Error) -> E,
{
    type Value = A::Value;
    type Error = E;

    fn transform(&self, input: Self::Value) -> Valid<Self::Value, Self::Error> {
        self.0.transform(input).map_err(&self.1)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct Append(&'static str);

    impl Transform for Append {
        type Value = Vec<&'static str>;
        type Error = String;

        fn transform(&self, mut input: Self::Value) -> Valid<Self::Value, Self::Error> {
            if input.contains(&self.0) {
                return Valid::fail(format!("`{}` already present", self.0));
            }
            input.push(self.0);
            Valid::succeed(input)
        }
    }

    #[test]
    fn test_pipe_runs_in_order() {
        let actual = Identity::default()
            .pipe(Append("accounts"))
            .pipe(Append("reviews"))
            .transform(vec![])
            .to_result()
            .unwrap();
        assert_eq!(actual, vec!["accounts", "reviews"]);
    }

    #[test]
    fn test_pipe_stops_on_failure() {
        let actual = Append("accounts")
            .pipe(Append("accounts"))
            .map_err(|e| e.len())
            .transform(vec![])
            .to_result();
        assert!(actual.is_err());
    }
}
