/// Elements with a JVM slot width
///
/// Values of type `long` or `double` take up two local variable slots; every
/// other value takes one. Frames rely on this when seeding locals from
/// parameters and when a store overwrites half of a wide value.
pub trait Width {
    fn width(&self) -> usize;
}
