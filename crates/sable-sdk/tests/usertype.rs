//! Registered host types: constructors, methods, metamethods, lifetimes.

use std::cell::Cell;
use std::rc::Rc;

use sable_sdk::{Error, Lib, State, Ud, UserType};

struct Fuser {
    x: i64,
}

impl Fuser {
    fn add(&self, y: i64) -> i64 {
        self.x + y
    }

    fn add2(&self, y: i64) -> i64 {
        self.x + y + 2
    }
}

fn fuser_state() -> State {
    let s = State::new();
    s.open_libraries(&[Lib::Base]);
    s.set_usertype(
        UserType::<Fuser>::new("fuser")
            .ctor(|| Fuser { x: 0 })
            .ctor(|x: i64| Fuser { x })
            .ctor(|x: i64, y: i64| Fuser { x: x + y })
            .method("add", Fuser::add)
            .method("add2", Fuser::add2)
            .method_mut("bump", |f: &mut Fuser, n: i64| {
                f.x += n;
                f.x
            }),
    )
    .unwrap();
    s
}

#[test]
fn constructor_overloads_dispatch_by_arity() {
    let s = fuser_state();
    s.script(
        "a = fuser.new(1)\n\
         b = fuser.new()\n\
         c = fuser.new(2, 3)\n\
         r1 = a:add(2)\n\
         r2 = a:add2(2)\n\
         r3 = b:add(1)\n\
         r4 = c:add(2)",
    )
    .unwrap();
    assert_eq!(s.get::<i64>("r1").unwrap(), 3);
    assert_eq!(s.get::<i64>("r2").unwrap(), 5);
    assert_eq!(s.get::<i64>("r3").unwrap(), 1);
    assert_eq!(s.get::<i64>("r4").unwrap(), 7);
}

#[test]
fn unmatched_constructor_arity_raises() {
    let s = fuser_state();
    let err = s.script("bad = fuser.new(1, 2, 3)").unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { got: 3, .. }));
    assert_eq!(err.to_string(), "no overload of 'fuser' takes 3 arguments");
    assert_eq!(s.vm().top(), 0);
}

#[test]
fn dot_and_colon_calls_are_equivalent() {
    let s = fuser_state();
    s.script(
        "a = fuser.new(1)\n\
         b = fuser:new(1)\n\
         r_colon = a:add(5)\n\
         r_dot = fuser.add(a, 5)\n\
         r_b = b:add(5)",
    )
    .unwrap();
    assert_eq!(s.get::<i64>("r_colon").unwrap(), 6);
    assert_eq!(s.get::<i64>("r_dot").unwrap(), 6);
    assert_eq!(s.get::<i64>("r_b").unwrap(), 6);
}

#[test]
fn mut_methods_mutate_the_instance() {
    let s = fuser_state();
    s.script(
        "f = fuser.new(10)\n\
         f:bump(5)\n\
         r = f:add(0)",
    )
    .unwrap();
    assert_eq!(s.get::<i64>("r").unwrap(), 15);
}

#[test]
fn host_handles_share_the_script_instance() {
    let s = fuser_state();
    let shared = Ud::new(Fuser { x: 100 });
    s.set("g", shared.clone()).unwrap();
    s.script("r = g:add(5)\ng:bump(1)").unwrap();
    assert_eq!(s.get::<i64>("r").unwrap(), 105);
    // the script-side mutation is visible through the host handle
    assert_eq!(shared.with(|f| f.x).unwrap(), 101);
}

#[test]
fn method_arguments_of_the_same_type() {
    struct Thing(#[allow(dead_code)] u8);

    let s = State::new();
    s.set_usertype(
        UserType::<Thing>::new("thing")
            .ctor(|| Thing(0))
            .method("is_self", |me: &Thing, other: Ud<Thing>| {
                other
                    .with(|o| std::ptr::eq(me as *const Thing, o as *const Thing))
                    .unwrap_or(false)
            }),
    )
    .unwrap();

    s.script(
        "a = thing.new()\n\
         b = thing.new()\n\
         same = a:is_self(a)\n\
         diff = a:is_self(b)",
    )
    .unwrap();
    assert!(s.get::<bool>("same").unwrap());
    assert!(!s.get::<bool>("diff").unwrap());
}

#[test]
fn metamethods_install_alongside_methods() {
    struct Vec2 {
        x: f64,
        y: f64,
    }

    let s = State::new();
    s.open_libraries(&[Lib::Base]);
    s.set_usertype(
        UserType::<Vec2>::new("vec2")
            .ctor(|x: f64, y: f64| Vec2 { x, y })
            .method("len2", |v: &Vec2| v.x * v.x + v.y * v.y)
            .method("__add", |a: &Vec2, b: Ud<Vec2>| {
                b.with(|b| Ud::new(Vec2 {
                    x: a.x + b.x,
                    y: a.y + b.y,
                }))
                .expect("operands borrow shared")
            })
            .method("__tostring", |v: &Vec2| format!("({}, {})", v.x, v.y))
            .method("__len", |_: &Vec2| 2i64),
    )
    .unwrap();

    s.script(
        "a = vec2.new(1.0, 2.0)\n\
         b = vec2.new(3.0, 4.0)\n\
         c = a + b\n\
         n = c:len2()\n\
         str = tostring(a)\n\
         dims = #a",
    )
    .unwrap();
    assert_eq!(s.get::<f64>("n").unwrap(), 52.0);
    assert_eq!(s.get::<String>("str").unwrap(), "(1, 2)");
    assert_eq!(s.get::<i64>("dims").unwrap(), 2);
}

#[test]
fn destructor_runs_exactly_once() {
    struct Crapola {
        counter: Rc<Cell<u32>>,
    }

    impl Drop for Crapola {
        fn drop(&mut self) {
            self.counter.set(self.counter.get() + 1);
        }
    }

    let destroyed = Rc::new(Cell::new(0u32));

    let s = State::new();
    s.open_libraries(&[Lib::Base]);
    let counter = destroyed.clone();
    s.set_usertype(UserType::<Crapola>::new("crapola").ctor(move || Crapola {
        counter: counter.clone(),
    }))
    .unwrap();

    s.script("c = crapola.new()").unwrap();
    assert_eq!(destroyed.get(), 0);

    // releasing the only script handle finalises the instance
    s.script("c = nil\ncollectgarbage()").unwrap();
    s.gc();
    assert_eq!(destroyed.get(), 1);

    // a fresh instance finalises independently
    s.script("d = crapola.new()\nd = nil").unwrap();
    s.gc();
    assert_eq!(destroyed.get(), 2);
}

#[test]
fn extracting_the_wrong_usertype_fails() {
    struct Alpha;
    struct Beta;

    let s = State::new();
    s.set_usertype(UserType::<Alpha>::new("alpha").ctor(|| Alpha))
        .unwrap();
    s.set_usertype(
        UserType::<Beta>::new("beta")
            .ctor(|| Beta)
            .method("check", |_: &Beta| true),
    )
    .unwrap();

    let err = s.script("a = alpha.new()\nbeta.check(a)").unwrap_err();
    assert!(matches!(err, Error::Script(_)));
}
