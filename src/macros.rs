/// Generates a doc link to a section of the JVM specification.
macro_rules! see_jvm_spec {
    ($chapter:literal $(, $sub:literal)*) => {
        concat!(
            "See the [JVM Specification §",
            $chapter, $(".", $sub,)*
            "](https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-",
            $chapter,
            ".html#jvms-",
            $chapter, $(".", $sub,)*
            ") for more information."
        )
    };
}

/// Returns early with a [`LoadErrorKind::ClassFormat`](crate::LoadErrorKind::ClassFormat) error.
macro_rules! malform {
    ($($arg:tt)*) => {
        return Err($crate::errors::LoadError::class_format(format!($($arg)*)))
    };
}

/// Returns early with a [`LoadErrorKind::ClassFormat`](crate::LoadErrorKind::ClassFormat) error
/// unless the condition holds.
macro_rules! check_format {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::macros::malform!($($arg)*);
        }
    };
}

pub(crate) use check_format;
pub(crate) use malform;
pub(crate) use see_jvm_spec;
