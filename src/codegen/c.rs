//! C code generation.
//!
//! Each statement becomes a macro over its iterators, invoked from the
//! scan code the solver produces for its domain. Declarations found while
//! walking are collected and hoisted to the top of the function body in
//! [`GraphVisitor::finish`], so storage exists before the first statement
//! runs whatever order the nodes were visited in.

use super::{argv_value, function_decl, GraphVisitor};
use crate::frontend::base_name;
use crate::graph::{DataNode, FlowGraph, MemAlloc, Node, NodeKind, StmtNode, StructNode};
use crate::polyhedral::text::parenthesize_words;
use crate::polyhedral::Formula;
use crate::solver::Scanner;
use crate::utils::errors::{GraphError, LookupError, PdfgResult};
use crate::utils::pretty::CodeFormatter;

/// Builtin macros the scan code and flattened accesses rely on.
const DEFINES: [(&str, &str); 8] = [
    ("min(x,y)", "(((x)<(y))?(x):(y))"),
    ("max(x,y)", "(((x)>(y))?(x):(y))"),
    ("intdiv(x,y)", "((x)/(y))"),
    ("floord(n,d)", "intdiv((n),(d))"),
    ("offset2(i,j,M)", "((j)+(i)*(M))"),
    ("offset3(i,j,k,M,N)", "((k)+((j)+(i)*(M))*(N))"),
    ("offset4(i,j,k,l,M,N,P)", "((l)+((k)+((j)+(i)*(M))*(N))*(P))"),
    (
        "array_init(ptr,val,size)",
        "for(unsigned __i__=0;__i__<(size);__i__++) (ptr)[__i__]=(val)",
    ),
];

const GET_TIME: (&str, &str) = (
    "double get_time()",
    "struct timeval tv; gettimeofday(&tv, 0); return (double) tv.tv_sec + (((double) tv.tv_usec) * 1E-6);",
);

const INDENT: &str = "  ";

/// Struct name and members.
pub type StructDef = (String, Vec<(String, String)>);

/// Emits one graph as a C function.
pub struct CodeGenVisitor<'s> {
    scanner: &'s mut Scanner,
    includes: Vec<String>,
    defines: Vec<(String, String)>,
    typedefs: Vec<(String, String)>,
    helpers: Vec<(String, String)>,
    structs: Vec<StructDef>,
    struct_name: Option<String>,
    unroll: Option<StructDef>,
    struct_init: Option<String>,
    profile: bool,
    lines: Vec<String>,
    allocs: Vec<(String, String)>,
    heap: Vec<String>,
    body_start: Option<usize>,
}

impl<'s> CodeGenVisitor<'s> {
    /// Visitor scanning statement domains through `scanner`.
    pub fn new(scanner: &'s mut Scanner) -> Self {
        Self {
            scanner,
            includes: vec!["stdio".into(), "stdlib".into(), "stdint".into()],
            defines: DEFINES
                .iter()
                .map(|(l, r)| (l.to_string(), r.to_string()))
                .collect(),
            typedefs: vec![
                ("float".into(), "real".into()),
                ("unsigned".into(), "itype".into()),
            ],
            helpers: Vec::new(),
            structs: Vec::new(),
            struct_name: None,
            unroll: None,
            struct_init: None,
            profile: false,
            lines: Vec::new(),
            allocs: Vec::new(),
            heap: Vec::new(),
            body_start: None,
        }
    }

    /// Time the top-level call in `main`.
    pub fn with_profile(mut self, profile: bool) -> Self {
        if profile && !self.profile {
            self.includes.push("sys/time".into());
            self.helpers
                .push((GET_TIME.0.to_string(), GET_TIME.1.to_string()));
        }
        self.profile = profile;
        self
    }

    /// Struct that temporaries are registered into.
    pub fn with_struct_name(mut self, name: &str) -> Self {
        self.struct_name = Some(name.to_string());
        self
    }

    /// Copy the members of struct parameter `name` into locals.
    pub fn with_unroll(mut self, name: &str, members: Vec<(String, String)>) -> Self {
        self.unroll = Some((name.to_string(), members));
        self
    }

    /// Return a new `name` struct holding the registered members.
    pub fn with_struct_init(mut self, name: &str) -> Self {
        self.struct_init = Some(name.to_string());
        self
    }

    /// Set `alias` to `ty`, replacing an existing alias of that name.
    pub fn with_typedef(mut self, ty: &str, alias: &str) -> Self {
        match self.typedefs.iter_mut().find(|(_, a)| a == alias) {
            Some(entry) => entry.0 = ty.to_string(),
            None => self.typedefs.push((ty.to_string(), alias.to_string())),
        }
        self
    }

    /// Struct definitions to declare in the header.
    pub fn with_structs(mut self, structs: &[StructDef]) -> Self {
        for (name, members) in structs {
            for (member, ty) in members {
                self.add_member(name, member, ty);
            }
        }
        self
    }

    /// Whether timing instrumentation is emitted.
    pub fn profile(&self) -> bool {
        self.profile
    }

    /// Lines emitted so far.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Append raw lines after the current output.
    pub fn extend_lines<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        self.lines.extend(lines);
    }

    /// Consume the visitor, keeping its lines.
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Struct typedefs collected from the graph.
    pub fn structs(&self) -> &[StructDef] {
        &self.structs
    }

    /// Members registered for struct `name`.
    pub fn struct_members(&self, name: &str) -> Option<&[(String, String)]> {
        self.structs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m.as_slice())
    }

    /// The generated source.
    pub fn code(&self) -> String {
        let mut code = self.lines.join("\n");
        code.push('\n');
        code
    }

    fn add_member(&mut self, name: &str, member: &str, ty: &str) {
        let members = match self.structs.iter().position(|(n, _)| n == name) {
            Some(pos) => &mut self.structs[pos].1,
            None => {
                self.structs.push((name.to_string(), Vec::new()));
                let last = self.structs.len() - 1;
                &mut self.structs[last].1
            }
        };
        match members.iter_mut().find(|(m, _)| m == member) {
            Some(entry) => entry.1 = ty.to_string(),
            None => members.push((member.to_string(), ty.to_string())),
        }
    }

    fn struct_key(&self, graph: &FlowGraph) -> String {
        match &self.struct_name {
            Some(name) => name.clone(),
            None => graph
                .name
                .split('_')
                .next()
                .unwrap_or(&graph.name)
                .to_string(),
        }
    }

    fn header(&mut self, graph: &FlowGraph) {
        let lines = &mut self.lines;
        for include in &self.includes {
            lines.push(format!("#include <{}.h>", include));
        }
        lines.push(String::new());

        for (lhs, rhs) in &self.defines {
            lines.push(format!("#define {} {}", lhs, rhs));
        }
        lines.push(String::new());

        for (ty, alias) in &self.typedefs {
            lines.push(format!("typedef {} {};", ty, alias));
        }
        lines.push(String::new());

        if !self.helpers.is_empty() {
            for (decl, body) in &self.helpers {
                lines.push(format!("static inline {} {{ {} }}", decl, body));
            }
            lines.push(String::new());
        }

        for (name, members) in &self.structs {
            let mut f = CodeFormatter::new(INDENT);
            let trailer = format!("}} {}{};", name, StructNode::SUFFIX);
            f.block("typedef struct", &trailer, |f| {
                for (member, ty) in members {
                    f.writeln(&format!("{} {};", ty, member));
                }
            });
            lines.extend(f.into_lines());
            lines.push(String::new());
        }

        let defined: Vec<_> = graph.constants().iter().filter(|c| c.has_value()).collect();
        if !defined.is_empty() {
            for constant in defined {
                lines.push(format!("#define {} {}", constant.name, constant.value));
            }
            lines.push(String::new());
        }

        if !graph.includes.is_empty() {
            for include in &graph.includes {
                if include.contains('.') {
                    lines.push(format!("#include \"{}\"", include));
                } else {
                    lines.push(format!("#include \"{}.h\"", include));
                }
            }
            lines.push(String::new());
        }
    }

    fn emit_stmt(&mut self, node: &Node, stmt: &StmtNode, graph: &FlowGraph) -> PdfgResult<()> {
        let formula = Formula::parse(&node.domain).ok().filter(|f| !f.is_relation());
        let iters: Vec<String> = formula.as_ref().map(|f| f.input.clone()).unwrap_or_default();
        let label = node.var_name();

        let body = stmt
            .statements
            .iter()
            .map(|s| parenthesize_words(s, &iters))
            .collect::<Vec<_>>()
            .join(";\\\n");
        let body = if stmt.condition.is_empty() {
            body
        } else {
            format!(
                "if ({}) {{  {};  }}",
                parenthesize_words(&stmt.condition, &iters),
                body
            )
        };
        let define = format!("#define {}({}) {}", label, iters.join(","), body);
        self.lines.extend(define.lines().map(str::to_string));

        // accumulations start from the default value on every entry
        let mut reset: Vec<&str> = Vec::new();
        for item in stmt.reads.iter().filter(|r| stmt.writes.contains(r)) {
            let name = base_name(item);
            if reset.contains(&name) {
                continue;
            }
            reset.push(name);
            let target = graph.get(name)?;
            let data = target.as_data().ok_or_else(|| {
                GraphError::InvalidObject(format!(
                    "'{}' reset by '{}' is a {} node",
                    name,
                    node.label,
                    target.kind_name()
                ))
            })?;
            let var = target.var_name();
            if target.is_scalar() {
                self.lines.push(format!("{}{} = {};", INDENT, var, data.defval));
            } else {
                self.lines.push(format!(
                    "{}array_init({}, {}, {});",
                    INDENT, var, data.defval, data.size
                ));
            }
        }
        self.lines.push(String::new());

        if formula.is_some() {
            let scan = self.scanner.scan(&label, &node.domain)?;
            log::debug!("Scan of '{}' has {} lines", label, scan.len());
            self.lines
                .extend(scan.into_iter().map(|l| format!("{}{}", INDENT, l)));
        } else {
            self.lines.push(format!("{}{}();", INDENT, label));
        }
        self.lines.push(format!("#undef {}", label));
        self.lines.push(String::new());
        Ok(())
    }

    fn emit_data(&mut self, node: &Node, data: &DataNode, graph: &FlowGraph) -> PdfgResult<()> {
        let var = node.var_name();
        let ty = &data.ty;
        let line = match data.alloc {
            MemAlloc::None => return Ok(()),
            MemAlloc::Struct => {
                let owner = graph.params().first().ok_or_else(|| {
                    LookupError::new(&var, format!("struct parameter of '{}'", graph.name))
                })?;
                if node.is_scalar() {
                    format!("{}{} {} = {}->{};", INDENT, ty, var, owner.name, var)
                } else {
                    format!("{}{}* restrict {} = {}->{};", INDENT, ty, var, owner.name, var)
                }
            }
            _ if node.is_scalar() => format!("{}{} {} = {};", INDENT, ty, var, data.defval),
            MemAlloc::Dynamic => {
                self.heap.push(var.clone());
                format!(
                    "{}{}* restrict {} = calloc({},sizeof({}));",
                    INDENT, ty, var, data.size, ty
                )
            }
            MemAlloc::Auto | MemAlloc::Static => {
                let storage = if data.alloc == MemAlloc::Static { "static " } else { "" };
                format!(
                    "{i}{s}{ty} {v}[{n}];\n{i}array_init({v}, {d}, {n});",
                    i = INDENT,
                    s = storage,
                    ty = ty,
                    v = var,
                    n = data.size,
                    d = data.defval
                )
            }
        };
        log::debug!("Allocating '{}' ({} x {})", var, data.size, ty);
        self.allocs.push((var, line));
        Ok(())
    }

    /// Heap array handed back to the caller: the last one no statement
    /// reads, else the first allocated.
    fn returned_var(&self, graph: &FlowGraph) -> Option<String> {
        let is_sink = |var: &String| {
            graph
                .nodes()
                .iter()
                .any(|n| n.var_name() == *var && graph.successors(&n.label).is_empty())
        };
        self.heap
            .iter()
            .rev()
            .find(|v| is_sink(v))
            .or_else(|| self.heap.first())
            .cloned()
    }

    fn main_function(&mut self, graph: &FlowGraph) {
        let args: Vec<String> = graph
            .params()
            .iter()
            .enumerate()
            .map(|(n, p)| argv_value(&p.ty, n + 1))
            .collect();
        let mut f = CodeFormatter::new(INDENT);
        f.block("int main(int argc, const char **argv)", "}  // main", |f| {
            if !args.is_empty() {
                f.writeln(&format!("if (argc < {}) {{", args.len() + 1));
                f.writeln(&format!(
                    "{}fprintf(stderr, \"usage: %s {}\\n\", argv[0]);",
                    INDENT,
                    graph
                        .params()
                        .iter()
                        .map(|p| p.name.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                ));
                f.writeln(&format!("{}return 1;", INDENT));
                f.writeln("}");
            }
            if self.profile {
                f.writeln("double tstart = get_time();");
            }
            let call = format!("{}({});", graph.name, args.join(", "));
            if graph.return_type == "void" {
                f.writeln(&call);
            } else {
                f.writeln(&format!("{} result = {}", graph.return_type, call));
            }
            if self.profile {
                f.writeln(&format!(
                    "fprintf(stderr,\"{}::%.6lf seconds elapsed\\n\", (get_time() - tstart));",
                    graph.name
                ));
            }
            if graph.return_type.ends_with('*') {
                f.writeln("free(result);");
            }
            f.writeln("return 0;");
        });
        self.lines.extend(f.into_lines());
    }
}

impl GraphVisitor for CodeGenVisitor<'_> {
    fn setup(&mut self, graph: &FlowGraph) -> PdfgResult<()> {
        if graph.is_parent() {
            self.header(graph);
        }

        let context = self.scanner.context_mut();
        for constant in graph.constants() {
            context.add_constant(constant.clone());
        }
        for function in graph.functions() {
            context.add_function(&function.name);
        }

        if !graph.subgraphs.is_empty() {
            return Ok(());
        }
        let decl = function_decl(&graph.return_type, &graph.name, graph.params());
        self.lines.push(format!("{};", decl));
        self.lines.push(format!("inline {} {{", decl));
        if let Some((owner, members)) = &self.unroll {
            for (member, ty) in members {
                let ty = if ty.contains('*') {
                    format!("{} restrict", ty)
                } else {
                    ty.clone()
                };
                self.lines
                    .push(format!("{}{} {} = {}->{};", INDENT, ty, member, owner, member));
            }
        }
        self.body_start = Some(self.lines.len());
        Ok(())
    }

    fn enter(&mut self, node: &Node, graph: &FlowGraph) -> PdfgResult<()> {
        match &node.kind {
            NodeKind::Stmt(stmt) => self.emit_stmt(node, stmt, graph),
            NodeKind::Data(data) => self.emit_data(node, data, graph),
            NodeKind::Temp(data) => {
                self.emit_data(node, data, graph)?;
                let ty = if node.is_scalar() {
                    data.ty.clone()
                } else {
                    format!("{}*", data.ty)
                };
                let key = self.struct_key(graph);
                self.add_member(&key, &node.var_name(), &ty);
                Ok(())
            }
            NodeKind::Struct(s) => {
                self.emit_data(node, &s.data, graph)?;
                for (member, ty) in &s.members {
                    self.add_member(&node.var_name(), member, ty);
                }
                Ok(())
            }
            NodeKind::Iter(iter) => {
                let relation = if iter.relation.is_empty() {
                    &node.domain
                } else {
                    &iter.relation
                };
                self.lines.push(format!("// {} := {}", node.label, relation));
                self.lines.push(String::new());
                Ok(())
            }
        }
    }

    fn finish(&mut self, graph: &FlowGraph) -> PdfgResult<()> {
        let key = self.struct_key(graph);
        if self.struct_init.is_some() || self.struct_members(&key).is_some() {
            for constant in graph.constants() {
                self.add_member(&key, &constant.name, &constant.ty);
            }
        }

        if let Some(start) = self.body_start {
            let allocs: Vec<String> = self
                .allocs
                .iter()
                .flat_map(|(_, code)| code.lines().map(str::to_string).collect::<Vec<_>>())
                .collect();
            if !allocs.is_empty() {
                let mut hoisted = allocs;
                hoisted.push(String::new());
                self.lines.splice(start..start, hoisted);
            }

            if let Some(name) = self.struct_init.clone() {
                let ty = format!("{}{}", name, StructNode::SUFFIX);
                let members = self.struct_members(&name).map(<[_]>::to_vec).unwrap_or_default();
                self.lines.push(format!(
                    "{}{}* {} = calloc(1, sizeof({}));",
                    INDENT, ty, name, ty
                ));
                for (member, _) in members {
                    self.lines
                        .push(format!("{}{}->{} = {};", INDENT, name, member, member));
                }
                self.lines.push(format!("{}return {};", INDENT, name));
            } else if graph.return_type == "void" {
                for var in &self.heap {
                    self.lines.push(format!("{}free({});", INDENT, var));
                }
            } else if let Some(result) = self.returned_var(graph) {
                for var in self.heap.iter().filter(|v| **v != result) {
                    self.lines.push(format!("{}free({});", INDENT, var));
                }
                self.lines.push(format!("{}return {};", INDENT, result));
            }
            self.lines.push(format!("}}  // {}", graph.name));
            self.lines.push(String::new());
        }

        if graph.is_parent() && graph.subgraphs.is_empty() {
            self.main_function(graph);
        }
        log::info!(
            "Generated {} lines for '{}' ({} allocations)",
            self.lines.len(),
            graph.name,
            self.allocs.len()
        );
        Ok(())
    }
}
