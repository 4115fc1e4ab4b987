//! Demo arithmetic grammar shared by the fuzz targets, written against the
//! generator contract the way processor-emitted rule functions are.

use grafl_runtime::{GenCtx, Grammar, Size};

const DIGITS: &[char] = &['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

fn start(ctx: &mut GenCtx<'_>) -> grafl_runtime::Result<()> {
    ctx.rule("start", |ctx| ctx.invoke("expr"))?;
    Ok(())
}

fn expr(ctx: &mut GenCtx<'_>) -> grafl_runtime::Result<()> {
    ctx.rule("expr", |ctx| {
        ctx.invoke("term")?;
        let mut more = ctx.quantifier(0, 0, None);
        while more.more(ctx) {
            more.repetition(ctx, |ctx| {
                let chosen = ctx.select_alternative(0, &[1.0, 1.0])?;
                ctx.alternative(0, chosen, |ctx| {
                    ctx.token("OP", if chosen == 0 { "+" } else { "-" })?;
                    Ok(())
                })?;
                ctx.invoke("term")
            })?;
        }
        Ok(())
    })?;
    Ok(())
}

fn term(ctx: &mut GenCtx<'_>) -> grafl_runtime::Result<()> {
    ctx.rule("term", |ctx| {
        let chosen = ctx.select_alternative(0, &[1.0, 1.0])?;
        ctx.alternative(0, chosen, |ctx| match chosen {
            0 => ctx.invoke("NUM"),
            _ => {
                ctx.token("OPEN", "(")?;
                ctx.with_reserve(1, |ctx| ctx.invoke("expr"))?;
                ctx.token("CLOSE", ")")?;
                Ok(())
            }
        })
    })?;
    Ok(())
}

fn num(ctx: &mut GenCtx<'_>) -> grafl_runtime::Result<()> {
    ctx.lexer_rule("NUM", |ctx| {
        ctx.emit_charset(0, DIGITS)?;
        let mut more = ctx.quantifier(0, 0, Some(8));
        while more.more(ctx) {
            more.repetition(ctx, |ctx| ctx.emit_charset(0, DIGITS))?;
        }
        Ok(())
    })?;
    Ok(())
}

pub fn grammar() -> Grammar {
    Grammar::builder("start")
        .rule("start", start, Size::new(4, 1))
        .rule("expr", expr, Size::new(3, 1))
        .rule("term", term, Size::new(2, 1))
        .rule("NUM", num, Size::new(1, 1))
        .alternation("expr", 0, &[Size::new(1, 1), Size::new(1, 1)])
        .alternation("term", 0, &[Size::new(1, 1), Size::new(3, 3)])
        .quantifier("expr", 0, Size::new(2, 2))
        .quantifier("NUM", 0, Size::new(0, 0))
        .build()
}
