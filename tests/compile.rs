use std::fs;
use std::path::PathBuf;
use std::process;

use pretty_assertions::assert_eq;
use rjackc::{
  CompileError, compile, compile_file, jack_sources, output_path, tokens_xml, unit_name,
};

const SEVEN: &str = "// Computes the value of 1 + (2 * 3) and prints it.
class Main {
   function void main() {
      do Output.printInt(1 + (2 * 3));
      return;
   }
}
";

const SEVEN_VM: &str = "function Main.main 0
push constant 1
push constant 2
push constant 3
call Math.multiply 2
add
call Output.printInt 1
pop temp 0
push constant 0
return
";

const LIST: &str = "/** A linked list of integers. */
class List {
    field int data;          // an int value,
    field List next;         // followed by a list of int values

    /* Creates a List. */
    constructor List new(int car, List cdr) {
        let data = car;
        let next = cdr;
        return this;
    }

    /** Accessors. */
    method int getData() { return data; }
    method int getNext() { return next; }

    /** Disposes this List by recursively disposing its tail. */
    method void dispose() {
        if (~(next = null)) {
            do next.dispose();
        }
        do Memory.deAlloc(this);
        return;
    }
}
";

const LIST_VM: &str = "function List.new 0
push constant 2
call Memory.alloc 1
pop pointer 0
push argument 0
pop this 0
push argument 1
pop this 1
push pointer 0
return
function List.getData 0
push argument 0
pop pointer 0
push this 0
return
function List.getNext 0
push argument 0
pop pointer 0
push this 1
return
function List.dispose 0
push argument 0
pop pointer 0
push this 1
push constant 0
eq
not
if-goto IF_TRUE0
goto IF_FALSE0
label IF_TRUE0
push this 1
call List.dispose 1
pop temp 0
label IF_FALSE0
push pointer 0
call Memory.deAlloc 1
pop temp 0
push constant 0
return
";

struct ScratchDir(PathBuf);

impl ScratchDir {
  fn new(name: &str) -> Self {
    let dir = std::env::temp_dir().join(format!("rjackc-{name}-{}", process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    Self(dir)
  }
}

impl Drop for ScratchDir {
  fn drop(&mut self) {
    let _ = fs::remove_dir_all(&self.0);
  }
}

#[test]
fn compiles_seven() {
  assert_eq!(compile("Main.jack", SEVEN).unwrap(), SEVEN_VM);
}

#[test]
fn compiles_list() {
  assert_eq!(compile("List.jack", LIST).unwrap(), LIST_VM);
}

#[test]
fn array_sum_program() {
  let source = "class Main {
    function int sum(Array a, int n) {
      var int i, total;
      let i = 0;
      while (i < n) {
        let total = total + a[i];
        let i = i + 1;
      }
      return total;
    }
  }";
  let vm = compile("Main.jack", source).unwrap();
  assert_eq!(
    vm,
    "function Main.sum 2
push constant 0
pop local 0
label WHILE_EXP0
push local 0
push argument 1
lt
not
if-goto WHILE_END0
push local 1
push local 0
push argument 0
add
pop pointer 1
push that 0
add
pop local 1
push local 0
push constant 1
add
pop local 0
goto WHILE_EXP0
label WHILE_END0
push local 1
return
"
  );
}

#[test]
fn compile_file_writes_vm_beside_source() {
  let dir = ScratchDir::new("file");
  let input = dir.0.join("Main.jack");
  fs::write(&input, SEVEN).unwrap();

  let output = output_path(&input, None, "", "vm");
  assert_eq!(output, dir.0.join("Main.vm"));

  compile_file(&input, &output).unwrap();
  assert_eq!(fs::read_to_string(&output).unwrap(), SEVEN_VM);
}

#[test]
fn failed_unit_keeps_partial_output() {
  let dir = ScratchDir::new("partial");
  let input = dir.0.join("Bad.jack");
  fs::write(
    &input,
    "class Bad {\n  function void f() {\n    return;\n  }\n  function void g() {\n    do ;\n  }\n}\n",
  )
  .unwrap();
  let output = dir.0.join("Bad.vm");

  let err = compile_file(&input, &output).unwrap_err();
  assert!(matches!(err, CompileError::Syntax { .. }));
  assert!(err.to_string().starts_with("Bad.jack:6:8: expected"));
  assert_eq!(
    fs::read_to_string(&output).unwrap(),
    "function Bad.f 0\npush constant 0\nreturn\nfunction Bad.g 0\n"
  );
}

#[test]
fn missing_input_is_a_read_error() {
  let dir = ScratchDir::new("missing");
  let input = dir.0.join("Nope.jack");
  let err = compile_file(&input, &dir.0.join("Nope.vm")).unwrap_err();
  assert!(matches!(err, CompileError::Read { .. }));
}

#[test]
fn directory_sources_are_sorted_jack_files() {
  let dir = ScratchDir::new("dir");
  for name in ["Main.jack", "Board.jack", "notes.txt", "Ball.jack"] {
    fs::write(dir.0.join(name), "").unwrap();
  }
  fs::create_dir(dir.0.join("Nested.jack")).unwrap();

  let names: Vec<String> = jack_sources(&dir.0)
    .unwrap()
    .iter()
    .map(|path| unit_name(path))
    .collect();
  assert_eq!(names, ["Ball.jack", "Board.jack", "Main.jack"]);

  let single = dir.0.join("Main.jack");
  assert_eq!(jack_sources(&single).unwrap(), vec![single]);
}

#[test]
fn out_dir_and_token_dump_paths() {
  let input = PathBuf::from("src/Square.jack");
  let out = PathBuf::from("build");
  assert_eq!(
    output_path(&input, Some(&out), "T", "xml"),
    PathBuf::from("build/SquareT.xml")
  );
}

#[test]
fn token_dump_for_a_class() {
  let xml = tokens_xml("Main.jack", "class Main { static int x; }").unwrap();
  assert_eq!(
    xml,
    "<tokens>
<keyword> class </keyword>
<identifier> Main </identifier>
<symbol> { </symbol>
<keyword> static </keyword>
<keyword> int </keyword>
<identifier> x </identifier>
<symbol> ; </symbol>
<symbol> } </symbol>
</tokens>
"
  );
}
