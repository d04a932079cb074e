use crate::emit::Generator;
use crate::error::BlockError;
use crate::order::{arithmetic_order, operand_orders, Order};
use crate::palette::Category;
use crate::registry::BlockRegistry;
use crate::rules::{ArgFallback, CallRule, Emission, EmitRule, MethodRule, NativeRule};
use crate::schema::{BlockSchema, Shape};
use crate::workspace::Block;

const CATEGORY_COLOURS: &[(&str, &str)] = &[
    ("Variables", "#FFD43B"),
    ("Values", "#f59e0b"),
    ("Logic", "#06b6d4"),
    ("Loops", "#8b5cf6"),
    ("Functions", "#6366f1"),
    ("Classes", "#14b8a6"),
    ("I/O", "#f97316"),
    ("Math", "#f59e0b"),
    ("Text", "#10b981"),
    ("Lists & Seqs", "#ec4899"),
    ("Dictionaries", "#fb923c"),
    ("Builtins", "#84cc16"),
    ("Imports", "#22d3ee"),
    ("Errors", "#ef4444"),
    ("Async", "#a78bfa"),
    ("Advanced", "#3f3f46"),
];

const COMPARE_OPS: &[&str] = &["==", "!=", "<", ">", "<=", ">=", "is", "is not", "in", "not in"];
const ARITHMETIC_OPS: &[&str] = &["+", "-", "*", "/", "//", "%", "**"];

const STR_METHOD_CHOICES: &[&str] = &[
    "upper()", "lower()", "strip()", "split()", "replace()", "join()", "startswith()",
    "endswith()", "find()", "count()", "format()", "encode()", "decode()", "title()",
    "capitalize()", "swapcase()", "center()", "ljust()", "rjust()", "zfill()", "isdigit()",
    "isalpha()", "isalnum()", "isspace()",
];
const STR_ARG_METHODS: &[&str] = &[
    "split", "join", "replace", "find", "rfind", "index", "rindex", "count",
];
const STR_TESTS: &[&str] = &[
    "isdigit", "isalpha", "isalnum", "isspace", "islower", "isupper", "istitle",
];

// (method, takes ARG, is a statement)
const LIST_METHODS: &[(&str, bool, bool)] = &[
    ("append", true, true),
    ("extend", true, true),
    ("insert", true, true),
    ("remove", true, true),
    ("pop", false, false),
    ("clear", false, true),
    ("sort", false, true),
    ("reverse", false, true),
    ("copy", false, false),
    ("index", true, false),
    ("count", false, false),
];
const DICT_METHODS: &[(&str, bool, bool)] = &[
    ("get", true, false),
    ("pop", true, false),
    ("popitem", false, true),
    ("keys", false, false),
    ("values", false, false),
    ("items", false, false),
    ("update", false, true),
    ("clear", false, true),
    ("setdefault", true, false),
];

// (name, parameters, produces a value)
const BUILTINS: &[(&str, &[&str], bool)] = &[
    ("int", &["value"], true),
    ("float", &["value"], true),
    ("str", &["value"], true),
    ("bool", &["value"], true),
    ("list", &["iterable"], true),
    ("tuple", &["iterable"], true),
    ("set", &["iterable"], true),
    ("dict", &["**kwargs"], true),
    ("frozenset", &["iterable"], true),
    ("bytes", &["source"], true),
    ("bytearray", &["source"], true),
    ("complex", &["real", "imag"], true),
    ("abs", &["x"], true),
    ("round", &["number", "ndigits"], true),
    ("min", &["*args"], true),
    ("max", &["*args"], true),
    ("sum", &["iterable"], true),
    ("pow", &["base", "exp"], true),
    ("divmod", &["a", "b"], true),
    ("len", &["obj"], true),
    ("sorted", &["iterable"], true),
    ("reversed", &["seq"], true),
    ("enumerate", &["iterable"], true),
    ("zip", &["*iterables"], true),
    ("map", &["func", "iterable"], true),
    ("filter", &["func", "iterable"], true),
    ("all", &["iterable"], true),
    ("any", &["iterable"], true),
    ("next", &["iterator"], true),
    ("iter", &["object"], true),
    ("slice", &["start", "stop", "step"], true),
    ("repr", &["obj"], true),
    ("format", &["value", "spec"], true),
    ("chr", &["i"], true),
    ("ord", &["c"], true),
    ("ascii", &["obj"], true),
    ("hex", &["x"], true),
    ("oct", &["x"], true),
    ("bin", &["x"], true),
    ("type", &["obj"], true),
    ("isinstance", &["obj", "cls"], true),
    ("issubclass", &["cls", "parent"], true),
    ("hasattr", &["obj", "name"], true),
    ("getattr", &["obj", "name"], true),
    ("setattr", &["obj", "name", "value"], false),
    ("delattr", &["obj", "name"], false),
    ("dir", &["obj"], true),
    ("vars", &["obj"], true),
    ("id", &["obj"], true),
    ("hash", &["obj"], true),
    ("callable", &["obj"], true),
    ("open", &["file", "mode"], true),
    ("exec", &["code"], false),
    ("eval", &["expression"], true),
    ("compile", &["source", "filename", "mode"], true),
    ("range", &["start", "stop", "step"], true),
    ("super", &[], true),
    ("property", &["fget"], true),
    ("staticmethod", &["func"], true),
    ("classmethod", &["func"], true),
    ("globals", &[], true),
    ("locals", &[], true),
    ("memoryview", &["obj"], true),
    ("object", &[], true),
];

const MATH_FUNCTIONS: &[&str] = &[
    "sqrt", "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "log",
    "log10", "log2", "ceil", "floor", "trunc", "fabs", "factorial", "gcd", "degrees", "radians",
    "isnan", "isinf", "copysign", "fmod", "remainder", "modf",
];
const MATH_CONSTANTS: &[&str] = &["pi", "e", "tau", "inf", "nan"];

pub fn register_builtins(registry: &mut BlockRegistry) {
    register_core(registry);
    register_control_flow(registry);
    register_definitions(registry);
    register_text(registry);
    register_collections(registry);

    for (name, params, has_output) in BUILTINS {
        let call = CallRule {
            callee: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            free_args: false,
            fallback: ArgFallback::Blank,
        };
        let shape = if *has_output { Shape::Expression } else { Shape::Statement };
        let schema = call
            .schema(&format!("python_builtin_{}", name), shape)
            .in_category("Builtins")
            .with_tooltip(format!("Python builtin: {}()", name));
        registry.register(schema, EmitRule::Call(call));
    }

    for name in MATH_FUNCTIONS {
        native(
            registry,
            BlockSchema::expression(format!("python_math_{}", name))
                .value("ARG", "0")
                .in_category("Math")
                .with_tooltip(format!("math.{}", name)),
            math_call,
        );
    }
    for name in MATH_CONSTANTS {
        registry.register(
            BlockSchema::expression(format!("python_math_{}", name)).in_category("Math"),
            EmitRule::Constant(format!("math.{}", name)),
        );
    }
}

pub fn stock_categories(registry: &BlockRegistry) -> Vec<Category> {
    CATEGORY_COLOURS
        .iter()
        .map(|(name, colour)| {
            let mut category = Category::new(*name, *colour);
            for type_id in registry.type_ids() {
                let in_section = registry
                    .lookup(type_id)
                    .map(|d| d.schema.category == *name)
                    .unwrap_or(false);
                if in_section {
                    category.push(type_id);
                }
            }
            category
        })
        .filter(|c| !c.block_types.is_empty())
        .collect()
}

fn native(registry: &mut BlockRegistry, schema: BlockSchema, rule: NativeRule) {
    registry.register(schema, EmitRule::Native(rule));
}

fn keyword(registry: &mut BlockRegistry, schema: BlockSchema, text: &str) {
    registry.register(schema, EmitRule::Constant(text.to_string()));
}

fn register_core(registry: &mut BlockRegistry) {
    native(
        registry,
        BlockSchema::statement("python_print").value("VALUE", "''").in_category("I/O"),
        print,
    );
    native(
        registry,
        BlockSchema::expression("python_input").value("PROMPT", "''").in_category("I/O"),
        input,
    );
    native(
        registry,
        BlockSchema::statement("python_assign")
            .text("VAR", "x")
            .value("VALUE", "0")
            .in_category("Variables"),
        assign,
    );
    native(
        registry,
        BlockSchema::expression("python_variable_get").text("VAR", "x").in_category("Variables"),
        variable_get,
    );
    native(
        registry,
        BlockSchema::expression("python_string").text("TEXT", "hello").in_category("Values"),
        string_literal,
    );
    native(
        registry,
        BlockSchema::expression("python_number").number("NUM", "0").in_category("Values"),
        number_literal,
    );
    native(
        registry,
        BlockSchema::expression("python_boolean")
            .choice("BOOL", &["True", "False"])
            .in_category("Values"),
        boolean_literal,
    );
    keyword(registry, BlockSchema::expression("python_none").in_category("Values"), "None");
    native(
        registry,
        BlockSchema::expression("python_fstring")
            .text("TEXT", "Hello {name}!")
            .in_category("Values"),
        fstring_literal,
    );
    native(
        registry,
        BlockSchema::expression("python_list").text("ITEMS", "1, 2, 3").in_category("Lists & Seqs"),
        list_literal,
    );
    native(
        registry,
        BlockSchema::expression("python_dict")
            .text("ITEMS", "\"key\": \"value\"")
            .in_category("Dictionaries"),
        braced_literal,
    );
    native(
        registry,
        BlockSchema::expression("python_tuple")
            .text("ITEMS", "1, 2, 3")
            .in_category("Lists & Seqs"),
        tuple_literal,
    );
    native(
        registry,
        BlockSchema::expression("python_set").text("ITEMS", "1, 2, 3").in_category("Lists & Seqs"),
        braced_literal,
    );

    native(
        registry,
        BlockSchema::expression("python_compare")
            .value("A", "0")
            .choice("OP", COMPARE_OPS)
            .value("B", "0")
            .in_category("Logic"),
        compare,
    );
    native(
        registry,
        BlockSchema::expression("python_arithmetic")
            .value("A", "0")
            .choice("OP", ARITHMETIC_OPS)
            .value("B", "0")
            .in_category("Math"),
        arithmetic,
    );
    native(
        registry,
        BlockSchema::expression("python_negate").value("VALUE", "0").in_category("Math"),
        negate,
    );
    native(
        registry,
        BlockSchema::expression("python_logic")
            .value("A", "False")
            .choice("OP", &["and", "or"])
            .value("B", "False")
            .in_category("Logic"),
        logic,
    );
    native(
        registry,
        BlockSchema::expression("python_not").value("VALUE", "False").in_category("Logic"),
        logical_not,
    );

    native(
        registry,
        BlockSchema::statement("python_comment").text("TEXT", "comment").in_category("Advanced"),
        comment,
    );
    native(
        registry,
        BlockSchema::statement("python_raw").text("CODE", "pass").in_category("Advanced"),
        raw_code,
    );
    native(
        registry,
        BlockSchema::statement("python_multiline_code")
            .text("CODE", "# Click to edit\npass")
            .in_category("Advanced"),
        raw_code,
    );
    keyword(registry, BlockSchema::statement("python_pass").in_category("Advanced"), "pass");
}

fn register_control_flow(registry: &mut BlockRegistry) {
    native(
        registry,
        BlockSchema::statement("python_if")
            .value("IF0", "False")
            .body("DO0")
            .in_category("Logic"),
        if_block,
    );
    native(
        registry,
        BlockSchema::statement("python_if_else")
            .value("IF0", "False")
            .body("DO0")
            .body("ELSE")
            .in_category("Logic"),
        if_else_block,
    );
    native(
        registry,
        BlockSchema::statement("python_elif")
            .value("CONDITION", "False")
            .body("DO")
            .in_category("Logic"),
        elif_block,
    );
    native(
        registry,
        BlockSchema::statement("python_for")
            .text("VAR", "i")
            .value("ITERABLE", "[]")
            .body("DO")
            .in_category("Loops"),
        for_loop,
    );
    native(
        registry,
        BlockSchema::statement("python_while")
            .value("CONDITION", "False")
            .body("DO")
            .in_category("Loops"),
        while_loop,
    );
    native(
        registry,
        BlockSchema::expression("python_range").value("STOP", "10").in_category("Loops"),
        range,
    );
    native(
        registry,
        BlockSchema::expression("python_list_comp")
            .text("EXPR", "x * 2")
            .text("VAR", "x")
            .value("ITERABLE", "[]")
            .in_category("Lists & Seqs"),
        list_comprehension,
    );
    keyword(
        registry,
        BlockSchema::statement("python_break").terminal().in_category("Loops"),
        "break",
    );
    keyword(
        registry,
        BlockSchema::statement("python_continue").terminal().in_category("Loops"),
        "continue",
    );

    native(
        registry,
        BlockSchema::statement("python_try")
            .body("TRY")
            .text("EXCEPTION", "Exception")
            .text("AS", "e")
            .body("EXCEPT")
            .in_category("Errors"),
        try_except,
    );
    native(
        registry,
        BlockSchema::statement("python_try_finally")
            .body("TRY")
            .text("EXCEPTION", "Exception")
            .text("AS", "e")
            .body("EXCEPT")
            .body("FINALLY")
            .in_category("Errors"),
        try_finally,
    );
    native(
        registry,
        BlockSchema::statement("python_raise")
            .text("EXCEPTION", "Exception(\"error\")")
            .terminal()
            .in_category("Errors"),
        raise,
    );
    native(
        registry,
        BlockSchema::statement("python_assert")
            .value("CONDITION", "True")
            .optional_value("MESSAGE")
            .in_category("Errors"),
        assert_stmt,
    );
    native(
        registry,
        BlockSchema::statement("python_with")
            .text("EXPR", "open(\"file.txt\")")
            .text("AS", "f")
            .body("BODY")
            .in_category("Advanced"),
        with_block,
    );
}

fn register_definitions(registry: &mut BlockRegistry) {
    native(
        registry,
        BlockSchema::statement("python_def")
            .text("NAME", "my_function")
            .text("PARAMS", "")
            .body("BODY")
            .in_category("Functions"),
        def_block,
    );
    native(
        registry,
        BlockSchema::statement("python_return")
            .optional_value("VALUE")
            .terminal()
            .in_category("Functions"),
        return_stmt,
    );
    native(
        registry,
        BlockSchema::statement("python_yield")
            .optional_value("VALUE")
            .in_category("Functions"),
        yield_stmt,
    );
    native(
        registry,
        BlockSchema::expression("python_call")
            .text("NAME", "my_function")
            .text("ARGS", "")
            .in_category("Functions"),
        named_call,
    );
    native(
        registry,
        BlockSchema::statement("python_call_statement")
            .text("NAME", "my_function")
            .text("ARGS", "")
            .in_category("Functions"),
        named_call,
    );
    native(
        registry,
        BlockSchema::expression("python_lambda")
            .text("PARAMS", "x")
            .text("EXPR", "x * 2")
            .in_category("Functions"),
        lambda,
    );
    native(
        registry,
        BlockSchema::statement("python_global").text("VAR", "variable").in_category("Functions"),
        global,
    );
    native(
        registry,
        BlockSchema::statement("python_nonlocal").text("VAR", "variable").in_category("Functions"),
        nonlocal,
    );
    native(
        registry,
        BlockSchema::statement("python_class")
            .text("NAME", "MyClass")
            .text("BASES", "")
            .body("BODY")
            .in_category("Classes"),
        class_block,
    );
    native(
        registry,
        BlockSchema::statement("python_import").text("MODULE", "os").in_category("Imports"),
        import,
    );
    native(
        registry,
        BlockSchema::statement("python_from_import")
            .text("MODULE", "os")
            .text("NAMES", "path")
            .in_category("Imports"),
        from_import,
    );
    native(
        registry,
        BlockSchema::statement("python_async_def")
            .text("NAME", "my_coroutine")
            .text("PARAMS", "")
            .body("BODY")
            .in_category("Async"),
        async_def_block,
    );
    native(
        registry,
        BlockSchema::new("python_await", Shape::Hybrid)
            .value("VALUE", "None")
            .in_category("Async"),
        await_expr,
    );
}

fn register_text(registry: &mut BlockRegistry) {
    native(
        registry,
        BlockSchema::expression("python_str_method")
            .value("STRING", "''")
            .choice("METHOD", STR_METHOD_CHOICES)
            .in_category("Text"),
        str_method,
    );
    for method in STR_ARG_METHODS {
        registry.register(
            BlockSchema::expression(format!("python_str_{}", method))
                .value("STRING", "''")
                .value("ARG", "''")
                .in_category("Text"),
            EmitRule::Method(MethodRule {
                receiver: "STRING".to_string(),
                method: method.to_string(),
                args: vec!["ARG".to_string()],
            }),
        );
    }
    for method in STR_TESTS {
        registry.register(
            BlockSchema::expression(format!("python_str_{}", method))
                .value("STRING", "''")
                .in_category("Text"),
            EmitRule::Method(MethodRule {
                receiver: "STRING".to_string(),
                method: method.to_string(),
                args: Vec::new(),
            }),
        );
    }
    native(
        registry,
        BlockSchema::expression("python_str_slice")
            .value("STRING", "''")
            .value("START", "0")
            .value("END", "")
            .in_category("Text"),
        str_slice,
    );
    registry.register(
        BlockSchema::expression("python_str_format_method")
            .value("STRING", "''")
            .value("ARGS", "")
            .in_category("Text"),
        EmitRule::Method(MethodRule {
            receiver: "STRING".to_string(),
            method: "format".to_string(),
            args: vec!["ARGS".to_string()],
        }),
    );
    native(
        registry,
        BlockSchema::expression("python_index")
            .value("COLLECTION", "[]")
            .value("INDEX", "0")
            .in_category("Lists & Seqs"),
        index,
    );
}

fn register_collections(registry: &mut BlockRegistry) {
    for (method, takes_arg, is_statement) in LIST_METHODS {
        let shape = if *is_statement { Shape::Statement } else { Shape::Expression };
        let mut schema =
            BlockSchema::new(format!("python_list_{}", method), shape).value("LIST", "[]");
        let mut args = Vec::new();
        if *takes_arg {
            schema = schema.value("ARG", "0");
            args.push("ARG".to_string());
        }
        if *method == "insert" {
            schema = schema.value("VALUE", "None");
            args.push("VALUE".to_string());
        }
        registry.register(
            schema.in_category("Lists & Seqs"),
            EmitRule::Method(MethodRule {
                receiver: "LIST".to_string(),
                method: method.to_string(),
                args,
            }),
        );
    }
    for (method, takes_key, is_statement) in DICT_METHODS {
        let shape = if *is_statement { Shape::Statement } else { Shape::Expression };
        let mut schema =
            BlockSchema::new(format!("python_dict_{}", method), shape).value("DICT", "{}");
        let mut args = Vec::new();
        if *takes_key {
            schema = schema.value("KEY", "\"\"");
            args.push("KEY".to_string());
        }
        if *method == "setdefault" {
            schema = schema.value("DEFAULT", "None");
            args.push("DEFAULT".to_string());
        }
        registry.register(
            schema.in_category("Dictionaries"),
            EmitRule::Method(MethodRule {
                receiver: "DICT".to_string(),
                method: method.to_string(),
                args,
            }),
        );
    }
}

fn stmt(code: String) -> Result<Emission, BlockError> {
    Ok(Emission::Statement(code))
}

fn expr(code: String, order: Order) -> Result<Emission, BlockError> {
    Ok(Emission::Expression(code, order))
}

fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

fn print(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let value = gen.value(block, "VALUE", Order::None)?;
    stmt(format!("print({})\n", value))
}

fn input(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let prompt = gen.value(block, "PROMPT", Order::None)?;
    expr(format!("input({})", prompt), Order::FunctionCall)
}

fn assign(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let value = gen.value(block, "VALUE", Order::None)?;
    stmt(format!("{} = {}\n", gen.field(block, "VAR"), value))
}

fn variable_get(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    expr(gen.field(block, "VAR"), Order::Atomic)
}

fn string_literal(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    expr(format!("\"{}\"", escape_string(&gen.field(block, "TEXT"))), Order::Atomic)
}

fn number_literal(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let number = gen.field(block, "NUM");
    let order = if number.starts_with('-') {
        Order::UnarySign
    } else {
        Order::Atomic
    };
    expr(number, order)
}

fn boolean_literal(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    expr(gen.field(block, "BOOL"), Order::Atomic)
}

fn fstring_literal(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    expr(format!("f\"{}\"", gen.field(block, "TEXT")), Order::Atomic)
}

fn list_literal(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    expr(format!("[{}]", gen.field(block, "ITEMS")), Order::Atomic)
}

fn tuple_literal(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    expr(format!("({})", gen.field(block, "ITEMS")), Order::Atomic)
}

fn braced_literal(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    expr(format!("{{{}}}", gen.field(block, "ITEMS")), Order::Atomic)
}

fn binary(
    gen: &mut Generator<'_>,
    block: &Block,
    op: &str,
    order: Order,
) -> Result<Emission, BlockError> {
    let (left, right) = operand_orders(order);
    let a = gen.value(block, "A", left)?;
    let b = gen.value(block, "B", right)?;
    expr(format!("{} {} {}", a, op, b), order)
}

fn compare(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let op = gen.field(block, "OP");
    binary(gen, block, &op, Order::Relational)
}

fn arithmetic(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let op = gen.field(block, "OP");
    let order = arithmetic_order(&op).unwrap_or(Order::Additive);
    binary(gen, block, &op, order)
}

fn logic(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let op = gen.field(block, "OP");
    let order = if op == "and" {
        Order::LogicalAnd
    } else {
        Order::LogicalOr
    };
    binary(gen, block, &op, order)
}

fn negate(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let value = gen.value(block, "VALUE", Order::UnarySign)?;
    expr(format!("-{}", value), Order::UnarySign)
}

fn logical_not(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let value = gen.value(block, "VALUE", Order::LogicalNot)?;
    expr(format!("not {}", value), Order::LogicalNot)
}

fn if_block(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let condition = gen.value(block, "IF0", Order::None)?;
    let body = gen.statement(block, "DO0")?;
    stmt(format!("if {}:\n{}", condition, body))
}

fn if_else_block(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let condition = gen.value(block, "IF0", Order::None)?;
    let body = gen.statement(block, "DO0")?;
    let otherwise = gen.statement(block, "ELSE")?;
    stmt(format!("if {}:\n{}else:\n{}", condition, body, otherwise))
}

fn elif_block(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let condition = gen.value(block, "CONDITION", Order::None)?;
    let body = gen.statement(block, "DO")?;
    stmt(format!("elif {}:\n{}", condition, body))
}

fn for_loop(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let iterable = gen.value(block, "ITERABLE", Order::None)?;
    let body = gen.statement(block, "DO")?;
    stmt(format!("for {} in {}:\n{}", gen.field(block, "VAR"), iterable, body))
}

fn while_loop(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let condition = gen.value(block, "CONDITION", Order::None)?;
    let body = gen.statement(block, "DO")?;
    stmt(format!("while {}:\n{}", condition, body))
}

fn range(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let stop = gen.value(block, "STOP", Order::None)?;
    expr(format!("range({})", stop), Order::FunctionCall)
}

fn list_comprehension(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let iterable = gen.value(block, "ITERABLE", Order::None)?;
    expr(
        format!(
            "[{} for {} in {}]",
            gen.field(block, "EXPR"),
            gen.field(block, "VAR"),
            iterable
        ),
        Order::Atomic,
    )
}

fn try_clauses(gen: &mut Generator<'_>, block: &Block) -> Result<String, BlockError> {
    let attempt = gen.statement(block, "TRY")?;
    let handler = gen.statement(block, "EXCEPT")?;
    Ok(format!(
        "try:\n{}except {} as {}:\n{}",
        attempt,
        gen.field(block, "EXCEPTION"),
        gen.field(block, "AS"),
        handler
    ))
}

fn try_except(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    stmt(try_clauses(gen, block)?)
}

fn try_finally(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let head = try_clauses(gen, block)?;
    let cleanup = gen.statement(block, "FINALLY")?;
    stmt(format!("{}finally:\n{}", head, cleanup))
}

fn raise(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    stmt(format!("raise {}\n", gen.field(block, "EXCEPTION")))
}

fn assert_stmt(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let condition = gen.value(block, "CONDITION", Order::None)?;
    match gen.value_opt(block, "MESSAGE", Order::None)? {
        Some(message) => stmt(format!("assert {}, {}\n", condition, message)),
        None => stmt(format!("assert {}\n", condition)),
    }
}

fn with_block(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let body = gen.statement(block, "BODY")?;
    stmt(format!(
        "with {} as {}:\n{}",
        gen.field(block, "EXPR"),
        gen.field(block, "AS"),
        body
    ))
}

fn def_block(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let body = gen.statement(block, "BODY")?;
    stmt(format!(
        "def {}({}):\n{}\n",
        gen.field(block, "NAME"),
        gen.field(block, "PARAMS"),
        body
    ))
}

fn async_def_block(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let body = gen.statement(block, "BODY")?;
    stmt(format!(
        "async def {}({}):\n{}\n",
        gen.field(block, "NAME"),
        gen.field(block, "PARAMS"),
        body
    ))
}

fn return_stmt(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    match gen.value_opt(block, "VALUE", Order::None)? {
        Some(value) => stmt(format!("return {}\n", value)),
        None => stmt("return\n".to_string()),
    }
}

fn yield_stmt(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    match gen.value_opt(block, "VALUE", Order::None)? {
        Some(value) => stmt(format!("yield {}\n", value)),
        None => stmt("yield\n".to_string()),
    }
}

fn named_call(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let code = format!("{}({})", gen.field(block, "NAME"), gen.field(block, "ARGS"));
    if block.type_id == "python_call_statement" {
        stmt(code + "\n")
    } else {
        expr(code, Order::FunctionCall)
    }
}

fn lambda(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    expr(
        format!("lambda {}: {}", gen.field(block, "PARAMS"), gen.field(block, "EXPR")),
        Order::Lambda,
    )
}

fn global(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    stmt(format!("global {}\n", gen.field(block, "VAR")))
}

fn nonlocal(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    stmt(format!("nonlocal {}\n", gen.field(block, "VAR")))
}

fn class_block(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let body = gen.statement(block, "BODY")?;
    let bases = gen.field(block, "BASES");
    let bases = if bases.trim().is_empty() {
        String::new()
    } else {
        format!("({})", bases)
    };
    stmt(format!("class {}{}:\n{}\n", gen.field(block, "NAME"), bases, body))
}

fn import(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    stmt(format!("import {}\n", gen.field(block, "MODULE")))
}

fn from_import(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    stmt(format!(
        "from {} import {}\n",
        gen.field(block, "MODULE"),
        gen.field(block, "NAMES")
    ))
}

fn await_expr(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let value = gen.value(block, "VALUE", Order::Member)?;
    expr(format!("await {}", value), Order::Await)
}

fn index(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let collection = gen.value(block, "COLLECTION", Order::Member)?;
    let index = gen.value(block, "INDEX", Order::None)?;
    expr(format!("{}[{}]", collection, index), Order::Member)
}

fn str_method(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let string = gen.value(block, "STRING", Order::Member)?;
    expr(format!("{}.{}", string, gen.field(block, "METHOD")), Order::FunctionCall)
}

fn str_slice(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let string = gen.value(block, "STRING", Order::Member)?;
    let start = gen.value(block, "START", Order::None)?;
    let end = gen.value(block, "END", Order::None)?;
    expr(format!("{}[{}:{}]", string, start, end), Order::Member)
}

fn comment(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    stmt(format!("# {}\n", gen.field(block, "TEXT")))
}

fn raw_code(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let code = gen.field(block, "CODE");
    if code.trim().is_empty() {
        return stmt(format!("{}\n", gen.options().placeholder));
    }
    stmt(code + "\n")
}

fn math_call(gen: &mut Generator<'_>, block: &Block) -> Result<Emission, BlockError> {
    let name = block
        .type_id
        .strip_prefix("python_math_")
        .unwrap_or(&block.type_id);
    let arg = gen.value(block, "ARG", Order::None)?;
    expr(format!("math.{}({})", name, arg), Order::FunctionCall)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{workspace_to_code, EmitOptions};
    use crate::workspace::Workspace;

    fn compile(ws: &Workspace, registry: &BlockRegistry) -> String {
        workspace_to_code(registry, ws, &EmitOptions::default()).unwrap()
    }

    #[test]
    fn empty_bodies_get_the_placeholder() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let cond = ws.add_block("python_if");
        let flag = ws.add_block("python_boolean");
        ws.set_field(flag, "BOOL", "True").unwrap();
        ws.connect_input(&registry, cond, "IF0", flag).unwrap();
        assert_eq!(compile(&ws, &registry), "if True:\n  pass\n");
    }

    #[test]
    fn invalid_literals_fall_back_to_defaults() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let print = ws.add_block("python_print");
        let number = ws.add_block("python_number");
        ws.set_field(number, "NUM", "twelve").unwrap();
        ws.connect_input(&registry, print, "VALUE", number).unwrap();
        let flag = ws.add_block("python_boolean");
        ws.set_field(flag, "BOOL", "Maybe").unwrap();
        assert_eq!(compile(&ws, &registry), "print(0)\n\nTrue\n");
    }

    #[test]
    fn strings_escape_double_quotes() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let text = ws.add_block("python_string");
        ws.set_field(text, "TEXT", "say \"hi\"").unwrap();
        assert_eq!(compile(&ws, &registry), "\"say \\\"hi\\\"\"\n");
    }

    #[test]
    fn strings_escape_backslashes_and_line_breaks() {
        let registry = BlockRegistry::with_builtins();
        let cases = [
            (r"C:\temp\", r#"print("C:\\temp\\")"#),
            (r#"say \"hi\""#, r#"print("say \\\"hi\\\"")"#),
            ("two\nlines\tend\r", r#"print("two\nlines\tend\r")"#),
        ];
        for (text, expected) in cases {
            let mut ws = Workspace::new();
            let print = ws.add_block("python_print");
            let literal = ws.add_block("python_string");
            ws.set_field(literal, "TEXT", text).unwrap();
            ws.connect_input(&registry, print, "VALUE", literal).unwrap();
            assert_eq!(compile(&ws, &registry), format!("{}\n", expected));
        }
    }

    #[test]
    fn optional_values_change_the_statement_form() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let ret = ws.add_block("python_return");
        assert_eq!(compile(&ws, &registry), "return\n");
        let value = ws.add_block("python_variable_get");
        ws.connect_input(&registry, ret, "VALUE", value).unwrap();
        assert_eq!(compile(&ws, &registry), "return x\n");
    }

    #[test]
    fn nested_bodies_indent_per_level() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let def = ws.add_block("python_def");
        let loop_ = ws.add_block("python_for");
        let range = ws.add_block("python_range");
        let print = ws.add_block("python_print");
        let var = ws.add_block("python_variable_get");
        ws.set_field(var, "VAR", "i").unwrap();
        ws.connect_input(&registry, def, "BODY", loop_).unwrap();
        ws.connect_input(&registry, loop_, "ITERABLE", range).unwrap();
        ws.connect_input(&registry, loop_, "DO", print).unwrap();
        ws.connect_input(&registry, print, "VALUE", var).unwrap();
        assert_eq!(
            compile(&ws, &registry),
            "def my_function():\n  for i in range(10):\n    print(i)\n"
        );
    }

    #[test]
    fn builtins_emit_their_argument_text() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let set = ws.add_block("python_builtin_setattr");
        let sup = ws.add_block("python_builtin_super");
        ws.connect_input(&registry, set, "IN0", sup).unwrap();
        assert_eq!(compile(&ws, &registry), "setattr(super(), name, value)\n");
    }

    #[test]
    fn method_blocks_bracket_loose_receivers() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let test = ws.add_block("python_str_isdigit");
        let sum = ws.add_block("python_arithmetic");
        ws.connect_input(&registry, test, "STRING", sum).unwrap();
        assert_eq!(compile(&ws, &registry), "(0 + 0).isdigit()\n");
    }

    #[test]
    fn await_stands_alone_as_a_statement() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        let body = ws.add_block("python_async_def");
        let wait = ws.add_block("python_await");
        let call = ws.add_block("python_call");
        ws.connect_input(&registry, body, "BODY", wait).unwrap();
        ws.connect_input(&registry, wait, "VALUE", call).unwrap();
        assert_eq!(
            compile(&ws, &registry),
            "async def my_coroutine():\n  await my_function()\n"
        );
    }

    #[test]
    fn stock_categories_follow_the_palette_order() {
        let registry = BlockRegistry::with_builtins();
        let categories = stock_categories(&registry);
        assert_eq!(categories[0].name, "Variables");
        let logic = categories.iter().find(|c| c.name == "Logic").unwrap();
        assert!(logic.block_types.contains(&"python_if".to_string()));
        assert!(categories.iter().all(|c| !c.block_types.is_empty()));
    }
}
