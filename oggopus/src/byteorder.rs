pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

macro_rules! impl_num_le {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t { #[inline] fn write_le(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_le_bytes()); }}
    )+ }
}

impl_num_le!(u8, i8, u16, i16, u32, i32, u64, i64);

macro_rules! impl_collection {
    ($trait:ident, $method:ident) => {
        impl<T: $trait> $trait for Vec<T> {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
        impl<T: $trait, const N: usize> $trait for [T; N] {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
    };
}

impl_collection!(WriteBytesLe, write_le);

/// Absent optional fields contribute no bytes.
impl<T: WriteBytesLe> WriteBytesLe for Option<T> {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        if let Some(value) = self {
            value.write_le(dst);
        }
    }
}

/// Strings are written as a 32-bit length followed by their UTF-8 bytes.
impl WriteBytesLe for String {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        (self.len() as u32).write_le(dst);
        dst.extend_from_slice(self.as_bytes());
    }
}

#[macro_export]
macro_rules! join_bytes_le {
    ( $($value:expr),+ $(,)? ) => {{
        use $crate::byteorder::WriteBytesLe;
        let mut vec = Vec::<u8>::new();
        $( $value.write_le(&mut vec); )+
        vec
    }};
}
