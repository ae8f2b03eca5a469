//! Dataflow-based optimization passes over JVM method bytecode
//!
//! The crate models method bodies as linear sequences of JVM instructions
//! (see [`jvm::code`]), reconstructs control flow from them, and runs a
//! forward fixpoint analysis (see [`analysis`]) whose per-instruction frames
//! drive bytecode-level rewrites (see [`opt`]).
//!
//! ### Simple example
//!
//! Removing a checkcast that can be proven redundant:
//!
//! ```
//! use jvmopt::jvm::code::{Insn, Method};
//! use jvmopt::jvm::{
//!     BinaryName, MethodAccessFlags, MethodDescriptor, Name, RefType, UnqualifiedName,
//! };
//! use jvmopt::opt::{MethodTransformer, RedundantCheckCastElimination};
//!
//! # fn run() -> Result<(), jvmopt::jvm::Error> {
//! let this_class = BinaryName::from_string(String::from("me/Example")).unwrap();
//! let foo = BinaryName::from_string(String::from("me/Foo")).unwrap();
//!
//! let mut method = Method::new(
//!     UnqualifiedName::from_string(String::from("castsFoo")).unwrap(),
//!     MethodDescriptor {
//!         parameters: vec![],
//!         return_type: Some(jvmopt::jvm::FieldType::object(foo.clone())),
//!     },
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//! );
//! method.push(Insn::New(foo.clone()));
//! method.push(Insn::CheckCast(RefType::Object(foo))); // `new` already produced exactly this type
//! method.push(Insn::AReturn);
//!
//! RedundantCheckCastElimination.transform(&this_class, &mut method)?;
//! assert_eq!(method.live_len(), 2);
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```

pub mod analysis;
pub mod jvm;
pub mod opt;
pub mod util;
