use crate::{
    db::{
        query::{
            Clause, ClauseKind, ColumnRef, CreateIndexStatement, DeleteStatement, Direction,
            DropIndexStatement, Expr, FieldDefinition, Func, InsertStatement, NaryOp, NullsOrder,
            OrderTerm, Projection, SelectQuery, Statement, UnaryOp, UpdateStatement,
        },
        sql::{BindOp, CompileError, CompiledStatement, Dialect},
    },
    model::{EntityModel, FieldKind, FieldModel},
    value::Value,
};

///
/// Scope
///
/// One SELECT (or the target of a DML statement) being rendered: the tables
/// its columns may come from and the field definitions it carries.
///

struct Scope {
    model: &'static EntityModel,
    tables: Vec<&'static EntityModel>,
    definitions: Vec<FieldDefinition>,
    /// FROM was overridden; computed columns render unqualified.
    from_override: bool,
}

///
/// ColumnSource
///
/// Where a column reference resolves to, in priority order.
///

enum ColumnSource {
    Override(Expr),
    Literal(&'static str),
    Skip,
    Table {
        table: &'static str,
        column: &'static str,
        qualify: bool,
    },
}

///
/// SqlCompiler
///
/// Single-use renderer: build one, feed it one statement, call `finish`.
/// Structural rendering lives here; fragments that differ per database are
/// delegated to the dialect, which calls back into the compiler for nested
/// expressions and binds so placeholder order always follows traversal order.
///

pub struct SqlCompiler<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    binds: Vec<BindOp>,
    columns: Vec<&'static str>,
    scopes: Vec<Scope>,
    overrides_enabled: bool,
    qualify: bool,
    hint: Option<FieldKind>,
}

impl<'d> SqlCompiler<'d> {
    #[must_use]
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            binds: Vec::new(),
            columns: Vec::new(),
            scopes: Vec::new(),
            overrides_enabled: true,
            qualify: true,
            hint: None,
        }
    }

    #[must_use]
    pub fn finish(self) -> CompiledStatement {
        CompiledStatement {
            sql: self.sql,
            binds: self.binds,
            columns: self.columns,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn push_ident(&mut self, ident: &str) {
        let quoted = self.dialect.quote_ident(ident);
        self.sql.push_str(&quoted);
    }

    /// Placeholder plus its bind operation.
    pub fn push_bind_op(&mut self, op: BindOp) {
        self.sql.push('?');
        self.binds.push(op);
    }

    /// Placeholder for `value`, encoded for the column currently compared.
    pub fn push_bind(&mut self, value: &Value) -> Result<(), CompileError> {
        self.push_bind_hinted(value, self.hint)
    }

    pub fn push_bind_hinted(
        &mut self,
        value: &Value,
        hint: Option<FieldKind>,
    ) -> Result<(), CompileError> {
        let op = BindOp::for_value(value, hint, self.dialect.native_arrays())?;
        self.push_bind_op(op);

        Ok(())
    }

    pub fn push_list(
        &mut self,
        exprs: &[Expr],
        separator: &str,
    ) -> Result<(), CompileError> {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.push_sql(separator);
            }
            self.render_expr(expr)?;
        }

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    pub fn statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Select(query) => self.select(query),
            Statement::Insert(stmt) => self.insert(stmt),
            Statement::Update(stmt) => self.update(stmt),
            Statement::Delete(stmt) => self.delete(stmt),
            Statement::CreateIndex(stmt) => self.create_index(stmt),
            Statement::DropIndex(stmt) => self.drop_index(stmt),
        }
    }

    pub fn select(&mut self, query: &SelectQuery) -> Result<(), CompileError> {
        self.with_scope(query, |c| c.select_body(query, false))
    }

    fn with_scope(
        &mut self,
        query: &SelectQuery,
        f: impl FnOnce(&mut Self) -> Result<(), CompileError>,
    ) -> Result<(), CompileError> {
        let model = query.model;
        let clauses = &query.clauses;

        if self.scopes.iter().any(|s| s.model == model)
            || clauses.joins().any(|j| j.model == model)
        {
            return Err(CompileError::AmbiguousSelfReference { entity: model.path });
        }

        let mut tables = vec![model];
        tables.extend(clauses.joins().map(|j| j.model));
        if let Some(models) = clauses.from_override() {
            tables.extend(models.iter().copied());
        }

        let definitions = clauses
            .iter()
            .filter_map(|c| match c {
                Clause::FieldDefinition(def) | Clause::FieldOverride(def) => Some(def.clone()),
                _ => None,
            })
            .collect();

        self.scopes.push(Scope {
            model,
            tables,
            definitions,
            from_override: clauses.from_override().is_some(),
        });
        let result = f(self);
        self.scopes.pop();

        result
    }

    // Single-table scope for DML and DDL; scope and qualification are
    // restored on every exit.
    fn with_table_scope(
        &mut self,
        model: &'static EntityModel,
        qualify: bool,
        f: impl FnOnce(&mut Self) -> Result<(), CompileError>,
    ) -> Result<(), CompileError> {
        self.scopes.push(Scope {
            model,
            tables: vec![model],
            definitions: Vec::new(),
            from_override: false,
        });
        let saved = std::mem::replace(&mut self.qualify, qualify);
        let result = f(self);
        self.qualify = saved;
        self.scopes.pop();

        result
    }

    fn select_body(&mut self, query: &SelectQuery, nested: bool) -> Result<(), CompileError> {
        let model = query.model;
        let clauses = &query.clauses;

        self.push_sql("SELECT ");
        match clauses.distinct() {
            Some(None) => self.push_sql("DISTINCT "),
            Some(Some(on)) => {
                if !self.dialect.supports_distinct_on() {
                    return Err(self.unsupported("DISTINCT ON"));
                }
                self.push_sql("DISTINCT ON (");
                self.push_list(on, ", ")?;
                self.push_sql(") ");
            }
            None => {}
        }

        if nested {
            self.push_sql("1");
        } else {
            self.projection(model, &query.projection)?;
        }

        // FROM
        let from: Vec<&'static str> = match clauses.from_override() {
            Some(models) => models
                .iter()
                .map(|m| {
                    m.render_table().ok_or(CompileError::NoTable {
                        entity: m.path,
                        action: "select from",
                    })
                })
                .collect::<Result<_, _>>()?,
            None => model.render_table().into_iter().collect(),
        };
        if from.is_empty() {
            if clauses.joins().next().is_some() {
                return Err(CompileError::NoTable {
                    entity: model.path,
                    action: "join against",
                });
            }
        } else {
            self.push_sql(" FROM ");
            for (i, table) in from.iter().enumerate() {
                if i > 0 {
                    self.push_sql(", ");
                }
                self.push_ident(table);
            }
        }

        for join in clauses.joins() {
            let table = join.model.render_table().ok_or(CompileError::NoTable {
                entity: join.model.path,
                action: "join against",
            })?;
            self.push_sql(" ");
            self.push_sql(join.kind.keyword());
            self.push_sql(" ");
            self.push_ident(table);
            self.push_sql(" ON ");
            self.render_expr(&join.on)?;
        }

        if let Some(where_clause) = clauses.where_clause() {
            self.push_sql(" WHERE ");
            self.render_expr(&where_clause.to_expr())?;
        }

        if let Some(group) = clauses.group_by() {
            self.push_sql(" GROUP BY ");
            self.push_list(group, ", ")?;
        }

        if let Some(order) = clauses.order_by() {
            self.order_by(order)?;
        }

        if let Some(limit) = clauses.limit() {
            let dialect = self.dialect;
            dialect.render_limit(self, limit.count, limit.offset);
        }

        if clauses.for_update() {
            self.push_sql(" FOR UPDATE");
        }

        Ok(())
    }

    fn projection(
        &mut self,
        model: &'static EntityModel,
        projection: &Projection,
    ) -> Result<(), CompileError> {
        let fields: Vec<&'static FieldModel> = match projection {
            Projection::Exprs(exprs) => return self.push_list(exprs, ", "),
            Projection::Keys => model
                .primary_key
                .iter()
                .filter_map(|name| model.field(name))
                .collect(),
            Projection::Record => model.fields.iter().collect(),
        };

        for field in fields {
            let column = ColumnRef { model, field };
            let source = self.resolve(column)?;
            if matches!(source, ColumnSource::Skip) {
                continue;
            }
            if !self.columns.is_empty() {
                self.push_sql(", ");
            }

            // aliases only ever appear here, in the projection list
            let aliased = !matches!(
                source,
                ColumnSource::Table { column, .. } if column == field.name
            );
            self.emit_source(column, source)?;
            if aliased {
                self.push_sql(" AS ");
                self.push_ident(field.name);
            }
            self.columns.push(field.name);
        }

        if self.columns.is_empty() {
            return Err(CompileError::EmptyProjection { entity: model.path });
        }

        Ok(())
    }

    fn order_by(&mut self, terms: &[OrderTerm]) -> Result<(), CompileError> {
        self.push_sql(" ORDER BY ");
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                self.push_sql(", ");
            }
            self.render_expr(&term.expr)?;
            self.push_sql(match term.direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
            if let Some(nulls) = term.nulls {
                if !self.dialect.supports_nulls_ordering() {
                    return Err(self.unsupported("NULLS FIRST/LAST ordering"));
                }
                self.push_sql(match nulls {
                    NullsOrder::First => " NULLS FIRST",
                    NullsOrder::Last => " NULLS LAST",
                });
            }
        }

        Ok(())
    }

    fn insert(&mut self, stmt: &InsertStatement) -> Result<(), CompileError> {
        let model = stmt.model;
        let table = model.table.ok_or(CompileError::NoTable {
            entity: model.path,
            action: "insert into",
        })?;

        self.push_sql("INSERT INTO ");
        self.push_ident(table);

        if stmt.values.is_empty() {
            self.push_sql(self.dialect.empty_insert_values());
            return Ok(());
        }

        self.push_sql(" (");
        for (i, (field, _)) in stmt.values.iter().enumerate() {
            if i > 0 {
                self.push_sql(", ");
            }
            self.push_ident(field.column);
        }
        self.push_sql(") VALUES (");
        for (i, (field, value)) in stmt.values.iter().enumerate() {
            if i > 0 {
                self.push_sql(", ");
            }
            self.push_bind_hinted(value, Some(field.kind))?;
        }
        self.push_sql(")");

        Ok(())
    }

    fn update(&mut self, stmt: &UpdateStatement) -> Result<(), CompileError> {
        let model = stmt.model;
        let table = model.table.ok_or(CompileError::NoTable {
            entity: model.path,
            action: "update",
        })?;
        let where_clause = stmt
            .where_clause
            .as_ref()
            .ok_or(CompileError::UpdateWithoutWhere { entity: model.path })?;
        if stmt.sets.is_empty() {
            return Err(CompileError::EmptyUpdate { entity: model.path });
        }

        self.with_table_scope(model, true, |c| {
            c.push_sql("UPDATE ");
            c.push_ident(table);
            c.push_sql(" SET ");
            for (i, (field, expr)) in stmt.sets.iter().enumerate() {
                if i > 0 {
                    c.push_sql(", ");
                }
                c.push_ident(field.column);
                c.push_sql(" = ");
                c.with_hint(Some(field.kind), |c| c.render_expr(expr))?;
            }
            c.push_sql(" WHERE ");
            c.render_expr(&where_clause.to_expr())
        })
    }

    fn delete(&mut self, stmt: &DeleteStatement) -> Result<(), CompileError> {
        let model = stmt.model;
        let table = model.table.ok_or(CompileError::NoTable {
            entity: model.path,
            action: "delete from",
        })?;

        if let Some(kind) = stmt
            .clauses
            .kinds()
            .into_iter()
            .find(|k| !matches!(k, ClauseKind::Where | ClauseKind::Limit))
        {
            return Err(CompileError::UnsupportedDeleteClause {
                entity: model.path,
                clause: kind,
            });
        }

        let limit = stmt.clauses.limit();
        if let Some(limit) = limit {
            if !self.dialect.supports_delete_limit() {
                return Err(self.unsupported("DELETE ... LIMIT"));
            }
            if limit.offset != 0 {
                return Err(self.unsupported("DELETE ... OFFSET"));
            }
        }

        self.with_table_scope(model, true, |c| {
            c.push_sql("DELETE FROM ");
            c.push_ident(table);
            if let Some(where_clause) = stmt.clauses.where_clause() {
                c.push_sql(" WHERE ");
                c.render_expr(&where_clause.to_expr())?;
            }
            if let Some(limit) = limit {
                c.push_sql(&format!(" LIMIT {}", limit.count));
            }

            Ok(())
        })
    }

    fn create_index(&mut self, stmt: &CreateIndexStatement) -> Result<(), CompileError> {
        let model = stmt.model;
        let table = model.table.ok_or(CompileError::NoTable {
            entity: model.path,
            action: "index",
        })?;
        if stmt.columns.is_empty() {
            return Err(CompileError::EmptyIndex {
                name: stmt.name.clone(),
            });
        }

        self.with_table_scope(model, false, |c| {
            c.push_sql(if stmt.unique {
                "CREATE UNIQUE INDEX "
            } else {
                "CREATE INDEX "
            });
            c.push_ident(&stmt.name);
            c.push_sql(" ON ");
            c.push_ident(table);
            c.push_sql(" (");
            for (i, column) in stmt.columns.iter().enumerate() {
                if i > 0 {
                    c.push_sql(", ");
                }
                if !matches!(column.expr, Expr::Column(_))
                    && !c.dialect.supports_expression_indexes()
                {
                    return Err(c.unsupported("expression index columns"));
                }
                c.render_expr(&column.expr)?;
                if column.direction == Direction::Desc {
                    c.push_sql(" DESC");
                }
            }
            c.push_sql(")");

            Ok(())
        })
    }

    fn drop_index(&mut self, stmt: &DropIndexStatement) -> Result<(), CompileError> {
        let dialect = self.dialect;
        dialect.render_drop_index(self, stmt)
    }

    // ---------------------------------------------------------------------
    // Columns
    // ---------------------------------------------------------------------

    fn override_for(&self, column: ColumnRef) -> Option<Expr> {
        self.scopes
            .iter()
            .rev()
            .find(|s| s.model == column.model)
            .and_then(|s| s.definitions.iter().find(|d| d.field == column.name()))
            .map(|d| d.expr.clone())
    }

    fn resolve(&self, column: ColumnRef) -> Result<ColumnSource, CompileError> {
        if self.overrides_enabled
            && let Some(expr) = self.override_for(column)
        {
            return Ok(ColumnSource::Override(expr));
        }

        let model = column.model;
        let field = column.field;
        let scope = self
            .scopes
            .iter()
            .rev()
            .find(|s| s.tables.contains(&model))
            .ok_or(CompileError::ColumnOutOfScope {
                entity: model.path,
                field: field.name,
            })?;

        if model.is_computed() {
            let directive = field.computed.unwrap_or_default();
            if let Some(sql) = directive.sql {
                return Ok(ColumnSource::Literal(sql));
            }
            if directive.optional {
                return Ok(ColumnSource::Skip);
            }
            let table = model
                .render_table()
                .ok_or(CompileError::UnresolvedComputedField {
                    entity: model.path,
                    field: field.name,
                })?;

            return Ok(ColumnSource::Table {
                table,
                column: field.column,
                qualify: self.qualify && !scope.from_override,
            });
        }

        let table = model.table.ok_or(CompileError::NoTable {
            entity: model.path,
            action: "read a column of",
        })?;

        Ok(ColumnSource::Table {
            table,
            column: field.column,
            qualify: self.qualify,
        })
    }

    fn emit_source(&mut self, column: ColumnRef, source: ColumnSource) -> Result<(), CompileError> {
        match source {
            ColumnSource::Override(expr) => {
                // one level of indirection only
                let saved = std::mem::replace(&mut self.overrides_enabled, false);
                let result = self.render_expr(&expr);
                self.overrides_enabled = saved;
                result
            }
            ColumnSource::Literal(sql) => {
                self.push_sql(sql);
                Ok(())
            }
            ColumnSource::Skip => Err(CompileError::UnresolvedComputedField {
                entity: column.model.path,
                field: column.field.name,
            }),
            ColumnSource::Table {
                table,
                column,
                qualify,
            } => {
                if qualify {
                    self.push_ident(table);
                    self.push_sql(".");
                }
                self.push_ident(column);
                Ok(())
            }
        }
    }

    /// Render a bare column reference through override / computed / table
    /// resolution.
    pub fn render_column(&mut self, column: ColumnRef) -> Result<(), CompileError> {
        let source = self.resolve(column)?;
        self.emit_source(column, source)
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn with_hint<T>(
        &mut self,
        hint: Option<FieldKind>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved = std::mem::replace(&mut self.hint, hint);
        let out = f(self);
        self.hint = saved;
        out
    }

    /// Static kind of an expression, when it is a bare column.
    #[must_use]
    pub const fn kind_of(expr: &Expr) -> Option<FieldKind> {
        match expr {
            Expr::Column(col) => Some(col.kind()),
            _ => None,
        }
    }

    fn render_operand(&mut self, expr: &Expr) -> Result<(), CompileError> {
        if matches!(expr, Expr::Binary { .. }) {
            self.push_sql("(");
            self.render_expr(expr)?;
            self.push_sql(")");
            Ok(())
        } else {
            self.render_expr(expr)
        }
    }

    pub fn render_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let dialect = self.dialect;

        match expr {
            Expr::Column(column) => self.render_column(*column)?,
            Expr::Literal(sql) => self.push_sql(sql),
            Expr::Bind(value) => self.push_bind(value)?,

            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => {
                    self.push_sql("NOT ");
                    self.render_operand(expr)?;
                }
                // `--` would open a line comment
                UnaryOp::Neg => {
                    self.push_sql("-(");
                    self.render_expr(expr)?;
                    self.push_sql(")");
                }
                UnaryOp::IsNull => {
                    self.render_operand(expr)?;
                    self.push_sql(" IS NULL");
                }
                UnaryOp::IsNotNull => {
                    self.render_operand(expr)?;
                    self.push_sql(" IS NOT NULL");
                }
            },

            Expr::Binary { op, lhs, rhs } => {
                let (lhs_kind, rhs_kind) = (Self::kind_of(lhs), Self::kind_of(rhs));
                self.with_hint(rhs_kind, |c| c.render_operand(lhs))?;
                self.push_sql(" ");
                self.push_sql(op.symbol());
                self.push_sql(" ");
                self.with_hint(lhs_kind, |c| c.render_operand(rhs))?;
            }

            Expr::Nary { op, args } => match args.as_slice() {
                [] => self.push_sql(dialect.bool_literal(*op == NaryOp::And)),
                [only] => self.render_expr(only)?,
                _ => {
                    self.push_sql("(");
                    let separator = match op {
                        NaryOp::And => " AND ",
                        NaryOp::Or => " OR ",
                    };
                    self.push_list(args, separator)?;
                    self.push_sql(")");
                }
            },

            Expr::In { expr, values } => {
                if values.is_empty() {
                    self.push_sql(dialect.bool_literal(false));
                } else {
                    dialect.render_in(self, expr, values)?;
                }
            }

            Expr::Function { func, args } => match func {
                Func::Trunc => dialect.render_trunc(self, args)?,
                Func::DatePart(part) => {
                    let arg = args.first().ok_or(CompileError::Unsupported {
                        dialect: dialect.kind(),
                        feature: "date part without an argument",
                    })?;
                    dialect.render_date_part(self, *part, arg)?;
                }
                Func::Abs
                | Func::Ceil
                | Func::Floor
                | Func::Round
                | Func::Sign
                | Func::Sqrt
                | Func::Exp
                | Func::Ln
                | Func::Power
                | Func::Lower
                | Func::Upper
                | Func::Length
                | Func::Now => {
                    self.push_sql(func.name());
                    self.push_sql("(");
                    self.push_list(args, ", ")?;
                    self.push_sql(")");
                }
            },

            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                self.push_sql(func.name());
                self.push_sql("(");
                if *distinct {
                    self.push_sql("DISTINCT ");
                }
                match arg {
                    Some(arg) => self.render_expr(arg)?,
                    None => self.push_sql("*"),
                }
                self.push_sql(")");
            }

            Expr::Case { whens, otherwise } => {
                self.push_sql("CASE");
                for (when, then) in whens {
                    self.push_sql(" WHEN ");
                    self.render_expr(when)?;
                    self.push_sql(" THEN ");
                    self.render_expr(then)?;
                }
                if let Some(otherwise) = otherwise {
                    self.push_sql(" ELSE ");
                    self.render_expr(otherwise)?;
                }
                self.push_sql(" END");
            }

            Expr::Conditional { op, args } => {
                self.push_sql(op.name());
                self.push_sql("(");
                self.push_list(args, ", ")?;
                self.push_sql(")");
            }

            Expr::Interval { amount, unit } => dialect.render_interval(self, *amount, *unit),
            Expr::Random => self.push_sql(dialect.random_function()),

            Expr::Exists(query) => {
                self.push_sql("EXISTS (");
                self.with_scope(query, |c| c.select_body(query, true))?;
                self.push_sql(")");
            }

            Expr::FullText(ft) => dialect.render_full_text(self, ft)?,
        }

        Ok(())
    }

    fn unsupported(&self, feature: &'static str) -> CompileError {
        CompileError::Unsupported {
            dialect: self.dialect.kind(),
            feature,
        }
    }
}
