use bytes::Bytes;

use crate::StreamError;

/// Unidirectional transform applied by a [`GateStream`].
///
/// `write_in` shapes outbound data, `write_out` shapes inbound data and may
/// swallow a buffer (`None`) when it is consumed or unusable — the pipeline
/// treats a swallowed buffer as packet loss. `overhead` reports bytes added
/// per write so upstream element budgets shrink accordingly.
///
/// [`GateStream`]: crate::GateStream
pub trait Gate {
    fn write_in(&mut self, data: Bytes) -> Result<Bytes, StreamError> {
        Ok(data)
    }

    fn write_out(&mut self, data: Bytes) -> Option<Bytes> {
        Some(data)
    }

    fn overhead(&self) -> usize {
        0
    }
}

macro_rules! impl_gate_for_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Gate),+> Gate for ($($name,)+) {
            fn write_in(&mut self, data: Bytes) -> Result<Bytes, StreamError> {
                let mut data = data;
                $( data = self.$idx.write_in(data)?; )+
                Ok(data)
            }

            fn write_out(&mut self, data: Bytes) -> Option<Bytes> {
                let mut data = data;
                // inbound folds in reverse gate order
                impl_gate_for_tuple!(@reverse self, data, [] [$($idx)+]);
                Some(data)
            }

            fn overhead(&self) -> usize {
                0 $( + self.$idx.overhead() )+
            }
        }
    };
    (@reverse $self:ident, $data:ident, [$($done:tt)*] [$head:tt $($rest:tt)*]) => {
        impl_gate_for_tuple!(@reverse $self, $data, [$head $($done)*] [$($rest)*]);
    };
    (@reverse $self:ident, $data:ident, [$($done:tt)*] []) => {
        $(
            $data = match $self.$done.write_out($data) {
                Some(next) => next,
                None => return None,
            };
        )*
    };
}

impl_gate_for_tuple!(A: 0);
impl_gate_for_tuple!(A: 0, B: 1);
impl_gate_for_tuple!(A: 0, B: 1, C: 2);
impl_gate_for_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_gate_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);

#[cfg(test)]
mod tests {
    use super::*;

    struct Tag(u8);

    impl Gate for Tag {
        fn write_in(&mut self, data: Bytes) -> Result<Bytes, StreamError> {
            let mut out = Vec::with_capacity(data.len() + 1);
            out.extend_from_slice(&data);
            out.push(self.0);
            Ok(Bytes::from(out))
        }

        fn write_out(&mut self, data: Bytes) -> Option<Bytes> {
            let (rest, tag) = data.split_at(data.len() - 1);
            (tag[0] == self.0).then(|| Bytes::copy_from_slice(rest))
        }

        fn overhead(&self) -> usize {
            1
        }
    }

    #[test]
    fn tuple_folds_in_order() {
        let mut chain = (Tag(1), Tag(2), Tag(3));
        let wire = chain.write_in(Bytes::from_static(b"x")).unwrap();
        assert_eq!(wire.as_ref(), b"x\x01\x02\x03");

        let back = chain.write_out(wire).unwrap();
        assert_eq!(back.as_ref(), b"x");
        assert_eq!(chain.overhead(), 3);
    }

    #[test]
    fn swallow_stops_the_fold() {
        let mut chain = (Tag(1), Tag(2));
        // wrong innermost tag: gate 2 rejects before gate 1 runs
        assert!(chain.write_out(Bytes::from_static(b"x\x01\x09")).is_none());
    }
}
