//! Link-time registration macros.
//!
//! Submissions are collected by [`Registry::global`](crate::Registry::global).

/// Registers a general server behavior at link time.
///
/// ```ignore
/// register_server!(echo, "echo", Echo::default);
/// ```
///
/// `$producer` is called once per incarnation and must not capture anything.
#[macro_export]
macro_rules! register_server {
	($name:ident, $id:expr, $producer:expr $(,)?) => {
		$crate::__private::paste::paste! {
			fn [<__bosun_produce_ $name:lower>]() -> ::std::boxed::Box<dyn $crate::ServerBehavior> {
				::std::boxed::Box::new(($producer)())
			}

			#[allow(non_upper_case_globals)]
			static [<BEHAVIOR_ $name:upper>]: $crate::BehaviorStatic = $crate::BehaviorStatic {
				id: $id,
				crate_name: env!("CARGO_PKG_NAME"),
				producer: $crate::StaticProducer::Server([<__bosun_produce_ $name:lower>]),
			};

			$crate::__private::inventory::submit!($crate::BehaviorReg(&[<BEHAVIOR_ $name:upper>]));
		}
	};
}

/// Registers an application behavior at link time.
///
/// ```ignore
/// register_application!(chat, "chat", ChatApp::default);
/// ```
#[macro_export]
macro_rules! register_application {
	($name:ident, $id:expr, $producer:expr $(,)?) => {
		$crate::__private::paste::paste! {
			fn [<__bosun_produce_ $name:lower>]() -> ::std::boxed::Box<dyn $crate::ApplicationBehavior> {
				::std::boxed::Box::new(($producer)())
			}

			#[allow(non_upper_case_globals)]
			static [<BEHAVIOR_ $name:upper>]: $crate::BehaviorStatic = $crate::BehaviorStatic {
				id: $id,
				crate_name: env!("CARGO_PKG_NAME"),
				producer: $crate::StaticProducer::Application([<__bosun_produce_ $name:lower>]),
			};

			$crate::__private::inventory::submit!($crate::BehaviorReg(&[<BEHAVIOR_ $name:upper>]));
		}
	};
}

/// Declares at link time that application `$id` starts after `$dependency`.
///
/// ```ignore
/// depend_on!("game", "chat");
/// ```
#[macro_export]
macro_rules! depend_on {
	($id:expr, $dependency:expr $(,)?) => {
		$crate::__private::inventory::submit!($crate::DependencyReg(&$crate::DependencyStatic {
			id: $id,
			dependency: $dependency,
		}));
	};
}
